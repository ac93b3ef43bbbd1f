use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Follow-up status of an order. `Delivered` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderStatus {
    #[default]
    #[serde(rename = "NoPO")]
    NoPo,
    #[serde(rename = "HasPO")]
    HasPo,
    InTransit,
    Delivered,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [
        OrderStatus::NoPo,
        OrderStatus::HasPo,
        OrderStatus::InTransit,
        OrderStatus::Delivered,
    ];

    /// Stable code used in storage and audit values.
    pub fn code(&self) -> &'static str {
        match self {
            OrderStatus::NoPo => "NoPO",
            OrderStatus::HasPo => "HasPO",
            OrderStatus::InTransit => "InTransit",
            OrderStatus::Delivered => "Delivered",
        }
    }

    /// Label used in the spreadsheets operators exchange.
    pub fn label(&self) -> &'static str {
        match self {
            OrderStatus::NoPo => "Sem OC",
            OrderStatus::HasPo => "Tem OC",
            OrderStatus::InTransit => "Em Transporte",
            OrderStatus::Delivered => "Entregue",
        }
    }

    /// Accepts both the codes and the spreadsheet labels, ignoring case,
    /// spacing and accents.
    pub fn parse(raw: &str) -> Option<Self> {
        let key: String = raw
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .map(|c| match c {
                'á' | 'à' | 'â' | 'ã' => 'a',
                'é' | 'ê' => 'e',
                'í' => 'i',
                'ó' | 'ô' | 'õ' => 'o',
                'ú' => 'u',
                other => other,
            })
            .collect();

        match key.as_str() {
            "nopo" | "semoc" | "sempo" => Some(OrderStatus::NoPo),
            "haspo" | "temoc" | "comoc" => Some(OrderStatus::HasPo),
            "intransit" | "emtransporte" | "emtransito" | "transito" => Some(OrderStatus::InTransit),
            "delivered" | "entregue" => Some(OrderStatus::Delivered),
            _ => None,
        }
    }

    /// HasPO and InTransit need a PO number. Delivered does not, since an
    /// order may be delivered straight from NoPO.
    pub fn requires_po_number(&self) -> bool {
        matches!(self, OrderStatus::HasPo | OrderStatus::InTransit)
    }

    pub fn forbids_po_number(&self) -> bool {
        matches!(self, OrderStatus::NoPo)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered)
    }

    /// Explicit edges of the status machine. Staying put is always allowed.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        if *self == next {
            return true;
        }
        matches!(
            (self, next),
            (NoPo, HasPo) | (HasPo, InTransit) | (InTransit, Delivered) | (NoPo, Delivered) | (HasPo, Delivered)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::parse(s).ok_or_else(|| format!("unknown status '{}'", s))
    }
}
