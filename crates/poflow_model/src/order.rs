use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{OrderId, OrderStatus, TenantId};

/// Business attributes of an order: everything a client may supply.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OrderFields {
    pub requisition_number: Option<String>,
    pub purchase_order_number: Option<String>,
    pub description: String,
    /// Department as typed by the operator; kept even when the lookup row
    /// could not be created.
    pub department: Option<String>,
    pub department_id: Option<String>,
    pub equipment_code: Option<String>,
    pub material_code: Option<String>,
    pub supplier_id: Option<String>,
    pub quantity_requested: Decimal,
    pub quantity_delivered: Decimal,
    pub status: OrderStatus,
    pub requested_date: Option<NaiveDate>,
    pub po_date: Option<NaiveDate>,
    pub expected_delivery_date: Option<NaiveDate>,
    pub actual_delivery_date: Option<NaiveDate>,
    pub unit_price: Option<Decimal>,
    pub last_purchase_price: Option<Decimal>,
    pub value_total: Decimal,
}

impl OrderFields {
    pub fn quantity_pending(&self) -> Decimal {
        (self.quantity_requested - self.quantity_delivered).max(Decimal::ZERO)
    }

    /// The key operators recognise the order by: PO number, else requisition.
    pub fn business_key(&self) -> Option<&str> {
        self.purchase_order_number
            .as_deref()
            .or(self.requisition_number.as_deref())
    }

    /// Text form of a field, as written to the audit trail and used to decide
    /// whether a field changed.
    pub fn value_of(&self, field: OrderField) -> Option<String> {
        fn date(d: &Option<NaiveDate>) -> Option<String> {
            d.map(|d| d.format("%Y-%m-%d").to_string())
        }
        fn dec(d: &Decimal) -> Option<String> {
            Some(d.normalize().to_string())
        }

        match field {
            OrderField::RequisitionNumber => self.requisition_number.clone(),
            OrderField::PurchaseOrderNumber => self.purchase_order_number.clone(),
            OrderField::Description => Some(self.description.clone()),
            OrderField::Department => self.department.clone(),
            OrderField::DepartmentId => self.department_id.clone(),
            OrderField::EquipmentCode => self.equipment_code.clone(),
            OrderField::MaterialCode => self.material_code.clone(),
            OrderField::SupplierId => self.supplier_id.clone(),
            OrderField::QuantityRequested => dec(&self.quantity_requested),
            OrderField::QuantityDelivered => dec(&self.quantity_delivered),
            OrderField::Status => Some(self.status.code().to_string()),
            OrderField::RequestedDate => date(&self.requested_date),
            OrderField::PoDate => date(&self.po_date),
            OrderField::ExpectedDeliveryDate => date(&self.expected_delivery_date),
            OrderField::ActualDeliveryDate => date(&self.actual_delivery_date),
            OrderField::UnitPrice => self.unit_price.as_ref().and_then(dec),
            OrderField::LastPurchasePrice => self.last_purchase_price.as_ref().and_then(dec),
            OrderField::ValueTotal => dec(&self.value_total),
        }
    }

    /// Fields whose text form differs between `self` and `other`, in
    /// declaration order.
    pub fn changed_fields(&self, other: &OrderFields) -> Vec<OrderField> {
        OrderField::ALL
            .into_iter()
            .filter(|f| self.value_of(*f) != other.value_of(*f))
            .collect()
    }
}

/// A stored order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub tenant_id: TenantId,
    /// Bumped by the store on every successful update.
    pub version: i64,
    #[serde(flatten)]
    pub fields: OrderFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn quantity_pending(&self) -> Decimal {
        self.fields.quantity_pending()
    }
}

/// Narrow projection returned by the key prefetch queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderKey {
    pub id: OrderId,
    pub purchase_order_number: Option<String>,
    pub requisition_number: Option<String>,
    pub value_total: Decimal,
}

impl From<&Order> for OrderKey {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id.clone(),
            purchase_order_number: order.fields.purchase_order_number.clone(),
            requisition_number: order.fields.requisition_number.clone(),
            value_total: order.fields.value_total,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderField {
    RequisitionNumber,
    PurchaseOrderNumber,
    Description,
    Department,
    DepartmentId,
    EquipmentCode,
    MaterialCode,
    SupplierId,
    QuantityRequested,
    QuantityDelivered,
    Status,
    RequestedDate,
    PoDate,
    ExpectedDeliveryDate,
    ActualDeliveryDate,
    UnitPrice,
    LastPurchasePrice,
    ValueTotal,
}

impl OrderField {
    pub const ALL: [OrderField; 18] = [
        OrderField::RequisitionNumber,
        OrderField::PurchaseOrderNumber,
        OrderField::Description,
        OrderField::Department,
        OrderField::DepartmentId,
        OrderField::EquipmentCode,
        OrderField::MaterialCode,
        OrderField::SupplierId,
        OrderField::QuantityRequested,
        OrderField::QuantityDelivered,
        OrderField::Status,
        OrderField::RequestedDate,
        OrderField::PoDate,
        OrderField::ExpectedDeliveryDate,
        OrderField::ActualDeliveryDate,
        OrderField::UnitPrice,
        OrderField::LastPurchasePrice,
        OrderField::ValueTotal,
    ];

    /// Name recorded in audit entries; matches the import column where one exists.
    pub fn name(&self) -> &'static str {
        match self {
            OrderField::RequisitionNumber => "nr_solicitacao",
            OrderField::PurchaseOrderNumber => "nr_oc",
            OrderField::Description => "descricao",
            OrderField::Department => "departamento",
            OrderField::DepartmentId => "departamento_id",
            OrderField::EquipmentCode => "cod_equipamento",
            OrderField::MaterialCode => "cod_material",
            OrderField::SupplierId => "fornecedor_id",
            OrderField::QuantityRequested => "qtde_solicitada",
            OrderField::QuantityDelivered => "qtde_entregue",
            OrderField::Status => "status",
            OrderField::RequestedDate => "data_solicitacao",
            OrderField::PoDate => "data_oc",
            OrderField::ExpectedDeliveryDate => "previsao_entrega",
            OrderField::ActualDeliveryDate => "data_entrega",
            OrderField::UnitPrice => "valor_unitario",
            OrderField::LastPurchasePrice => "valor_ultima_compra",
            OrderField::ValueTotal => "valor_total",
        }
    }

    /// Fields a conservative import is allowed to overwrite on an existing order.
    pub fn is_conservative(&self) -> bool {
        matches!(
            self,
            OrderField::Status
                | OrderField::RequestedDate
                | OrderField::PoDate
                | OrderField::ExpectedDeliveryDate
                | OrderField::ActualDeliveryDate
                | OrderField::QuantityRequested
                | OrderField::QuantityDelivered
                | OrderField::ValueTotal
                | OrderField::SupplierId
                | OrderField::Department
                | OrderField::DepartmentId
        )
    }
}
