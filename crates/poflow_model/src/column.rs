use serde::{Deserialize, Serialize};
use std::fmt;

/// Column contract of the order import file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Column {
    RequisitionNumber,
    PurchaseOrderNumber,
    Department,
    EquipmentCode,
    MaterialCode,
    Description,
    QuantityRequested,
    UnitPrice,
    LastPurchasePrice,
    SupplierCode,
    SupplierName,
    SupplierCity,
    SupplierState,
    RequestedDate,
    PoDate,
    ExpectedDeliveryDate,
    Status,
    ValueTotal,
}

impl Column {
    pub const ALL: [Column; 18] = [
        Column::RequisitionNumber,
        Column::PurchaseOrderNumber,
        Column::Department,
        Column::EquipmentCode,
        Column::MaterialCode,
        Column::Description,
        Column::QuantityRequested,
        Column::UnitPrice,
        Column::LastPurchasePrice,
        Column::SupplierCode,
        Column::SupplierName,
        Column::SupplierCity,
        Column::SupplierState,
        Column::RequestedDate,
        Column::PoDate,
        Column::ExpectedDeliveryDate,
        Column::Status,
        Column::ValueTotal,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Column::RequisitionNumber => "nr_solicitacao",
            Column::PurchaseOrderNumber => "nr_oc",
            Column::Department => "departamento",
            Column::EquipmentCode => "cod_equipamento",
            Column::MaterialCode => "cod_material",
            Column::Description => "descricao",
            Column::QuantityRequested => "qtde_solicitada",
            Column::UnitPrice => "valor_unitario",
            Column::LastPurchasePrice => "valor_ultima_compra",
            Column::SupplierCode => "cod_fornecedor",
            Column::SupplierName => "nome_fornecedor",
            Column::SupplierCity => "cidade_fornecedor",
            Column::SupplierState => "uf_fornecedor",
            Column::RequestedDate => "data_solicitacao",
            Column::PoDate => "data_oc",
            Column::ExpectedDeliveryDate => "previsao_entrega",
            Column::Status => "status",
            Column::ValueTotal => "valor_total",
        }
    }

    /// Matches a header cell, ignoring case and surrounding blanks.
    pub fn from_header(header: &str) -> Option<Column> {
        let key = header.trim().trim_start_matches('\u{feff}').to_lowercase();
        Column::ALL.into_iter().find(|c| c.name() == key)
    }

    pub fn is_date(&self) -> bool {
        matches!(self, Column::RequestedDate | Column::PoDate | Column::ExpectedDeliveryDate)
    }

    pub fn is_money(&self) -> bool {
        matches!(self, Column::UnitPrice | Column::LastPurchasePrice | Column::ValueTotal)
    }

    /// Identifier columns get code cleanup (`123.0` -> `123`).
    pub fn is_code(&self) -> bool {
        matches!(
            self,
            Column::RequisitionNumber
                | Column::PurchaseOrderNumber
                | Column::EquipmentCode
                | Column::MaterialCode
                | Column::SupplierCode
        )
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
