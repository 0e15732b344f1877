//! Closed registry of the CSV tables this pipeline understands.
//!
//! The exact header line of an incoming file selects the descriptor; an
//! unknown header is an explicit error. There is no subclass scanning or
//! schema inference.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Transactions,
    TransactionItems,
    Stores,
    Users,
}

impl TableKind {
    pub const ALL: [TableKind; 4] = [
        TableKind::Transactions,
        TableKind::TransactionItems,
        TableKind::Stores,
        TableKind::Users,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TableKind::Transactions => "transactions",
            TableKind::TransactionItems => "transaction_items",
            TableKind::Stores => "stores",
            TableKind::Users => "users",
        }
    }

    /// The column names, in wire order.
    pub fn header(&self) -> &'static [&'static str] {
        match self {
            TableKind::Transactions => &[
                "transaction_id",
                "store_id",
                "user_id",
                "original_amount",
                "final_amount",
                "created_at",
            ],
            TableKind::TransactionItems => &[
                "transaction_id",
                "item_id",
                "quantity",
                "unit_price",
                "subtotal",
                "created_at",
            ],
            TableKind::Stores => &[
                "store_id",
                "store_name",
                "street",
                "postal_code",
                "city",
                "state",
                "latitude",
                "longitude",
            ],
            TableKind::Users => &["user_id", "gender", "birthdate", "registered_at"],
        }
    }

    /// Resolve a decoded header line to a table, by exact signature match.
    pub fn from_header(fields: &[&str]) -> Option<TableKind> {
        TableKind::ALL
            .into_iter()
            .find(|kind| kind.header() == fields)
    }
}
