//! Raw cell cleanup. Pure; never fails. Anything that cannot be coerced
//! becomes `None`, and the column is remembered in `unparsed` so the
//! validator can tell "empty" from "garbage".

use chrono::NaiveDate;
use poflow_common::{
    clean_code, clean_text, code_from_f64, date_from_excel_serial, decimal_from_f64, parse_date, parse_decimal,
    parse_quantity,
};
use poflow_model::{Column, OrderStatus};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::source::{RawRow, RawValue};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizedRow {
    pub line: usize,
    pub requisition_number: Option<String>,
    pub purchase_order_number: Option<String>,
    pub department: Option<String>,
    pub equipment_code: Option<String>,
    pub material_code: Option<String>,
    pub description: Option<String>,
    pub quantity_requested: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub last_purchase_price: Option<Decimal>,
    /// Supplier code as typed; `supplier_code` holds it when it is an integer.
    pub supplier_code_text: Option<String>,
    pub supplier_code: Option<i64>,
    pub supplier_name: Option<String>,
    pub supplier_city: Option<String>,
    pub supplier_state: Option<String>,
    pub requested_date: Option<NaiveDate>,
    pub po_date: Option<NaiveDate>,
    pub expected_delivery_date: Option<NaiveDate>,
    pub status_text: Option<String>,
    pub status: Option<OrderStatus>,
    pub value_total: Option<Decimal>,
    /// Columns with a non-empty raw value that did not survive coercion.
    pub unparsed: Vec<Column>,
}

impl NormalizedRow {
    /// PO number when present, else requisition number.
    pub fn key(&self) -> Option<&str> {
        self.purchase_order_number
            .as_deref()
            .or(self.requisition_number.as_deref())
    }

    /// Overlays the non-empty cells of a later row carrying the same key.
    pub fn absorb(&mut self, later: &NormalizedRow) {
        fn take<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                target.clone_from(value);
            }
        }

        take(&mut self.requisition_number, &later.requisition_number);
        take(&mut self.purchase_order_number, &later.purchase_order_number);
        take(&mut self.department, &later.department);
        take(&mut self.equipment_code, &later.equipment_code);
        take(&mut self.material_code, &later.material_code);
        take(&mut self.description, &later.description);
        take(&mut self.quantity_requested, &later.quantity_requested);
        take(&mut self.unit_price, &later.unit_price);
        take(&mut self.last_purchase_price, &later.last_purchase_price);
        if later.supplier_code_text.is_some() {
            self.supplier_code_text.clone_from(&later.supplier_code_text);
            self.supplier_code = later.supplier_code;
        }
        take(&mut self.supplier_name, &later.supplier_name);
        take(&mut self.supplier_city, &later.supplier_city);
        take(&mut self.supplier_state, &later.supplier_state);
        take(&mut self.requested_date, &later.requested_date);
        take(&mut self.po_date, &later.po_date);
        take(&mut self.expected_delivery_date, &later.expected_delivery_date);
        if later.status_text.is_some() {
            self.status_text.clone_from(&later.status_text);
            self.status = later.status;
        }
        take(&mut self.value_total, &later.value_total);
        for column in &later.unparsed {
            if !self.unparsed.contains(column) {
                self.unparsed.push(*column);
            }
        }
    }
}

fn text(value: &RawValue) -> Option<String> {
    match value {
        RawValue::Empty => None,
        RawValue::Text(s) => clean_text(s),
        RawValue::Number(n) | RawValue::DateSerial(n) => code_from_f64(*n),
    }
}

fn code(value: &RawValue) -> Option<String> {
    match value {
        RawValue::Text(s) => clean_code(s),
        other => text(other),
    }
}

fn number(value: &RawValue) -> Option<Decimal> {
    match value {
        RawValue::Empty => None,
        RawValue::Text(s) => parse_decimal(s),
        RawValue::Number(n) | RawValue::DateSerial(n) => decimal_from_f64(*n),
    }
}

fn quantity(value: &RawValue) -> Option<Decimal> {
    match value {
        RawValue::Text(s) => parse_quantity(s),
        other => number(other),
    }
}

fn date(value: &RawValue) -> Option<NaiveDate> {
    match value {
        RawValue::Empty => None,
        RawValue::Text(s) => parse_date(s),
        RawValue::Number(n) | RawValue::DateSerial(n) => date_from_excel_serial(*n),
    }
}

pub fn normalize(raw: &RawRow) -> NormalizedRow {
    let mut unparsed = Vec::new();
    let mut track = |column: Column, present: bool| {
        if !present && !raw.get(column).is_blank() && text(raw.get(column)).is_some() {
            unparsed.push(column);
        }
    };

    let quantity_requested = quantity(raw.get(Column::QuantityRequested));
    track(Column::QuantityRequested, quantity_requested.is_some());
    let unit_price = number(raw.get(Column::UnitPrice));
    track(Column::UnitPrice, unit_price.is_some());
    let last_purchase_price = number(raw.get(Column::LastPurchasePrice));
    track(Column::LastPurchasePrice, last_purchase_price.is_some());
    let value_total = number(raw.get(Column::ValueTotal));
    track(Column::ValueTotal, value_total.is_some());

    let requested_date = date(raw.get(Column::RequestedDate));
    track(Column::RequestedDate, requested_date.is_some());
    let po_date = date(raw.get(Column::PoDate));
    track(Column::PoDate, po_date.is_some());
    let expected_delivery_date = date(raw.get(Column::ExpectedDeliveryDate));
    track(Column::ExpectedDeliveryDate, expected_delivery_date.is_some());

    let status_text = text(raw.get(Column::Status));
    let status = status_text.as_deref().and_then(OrderStatus::parse);
    track(Column::Status, status.is_some());

    let supplier_code_text = code(raw.get(Column::SupplierCode));
    let supplier_code = supplier_code_text.as_deref().and_then(|c| c.parse::<i64>().ok());
    track(Column::SupplierCode, supplier_code.is_some());

    NormalizedRow {
        line: raw.line,
        requisition_number: code(raw.get(Column::RequisitionNumber)),
        purchase_order_number: code(raw.get(Column::PurchaseOrderNumber)),
        department: text(raw.get(Column::Department)),
        equipment_code: code(raw.get(Column::EquipmentCode)),
        material_code: code(raw.get(Column::MaterialCode)),
        description: text(raw.get(Column::Description)),
        quantity_requested,
        unit_price,
        last_purchase_price,
        supplier_code_text,
        supplier_code,
        supplier_name: text(raw.get(Column::SupplierName)),
        supplier_city: text(raw.get(Column::SupplierCity)),
        supplier_state: text(raw.get(Column::SupplierState)).map(|s| s.to_uppercase()),
        requested_date,
        po_date,
        expected_delivery_date,
        status_text,
        status,
        value_total,
        unparsed,
    }
}
