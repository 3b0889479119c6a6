//! Built-in oil-and-gas mappings applied before any configuration file.

use super::{ColumnMapping, Config, TableMapping};
use crate::normalize::Normalizer;
use crate::rules::Severity;
use crate::typemap::ColumnType;
use std::collections::BTreeMap;

/// Legacy numbering tables and the sequences they seed.
pub const COUNTER_TABLES: &[(&str, &str)] = &[
    ("tblCounter", "counter_seq"),
    ("tblWorkOrderCounter", "work_order_seq"),
    ("tblInvoiceCounter", "invoice_seq"),
];

impl Config {
    /// Configuration made only of built-in defaults.
    pub fn builtin() -> Self {
        Config {
            oil_gas_mappings: default_column_mappings(),
            table_mappings: default_table_mappings(),
            ..Default::default()
        }
    }
}

fn mapping(
    sources: &[&str],
    target: &str,
    data_type: ColumnType,
    rules: &[Normalizer],
) -> ColumnMapping {
    ColumnMapping {
        source_columns: sources.iter().map(|s| s.to_string()).collect(),
        target_column: target.to_string(),
        data_type,
        required: false,
        default: None,
        rules: rules.to_vec(),
        severity: Severity::Error,
    }
}

/// Logical fields every legacy shop database carries in some spelling.
pub fn default_column_mappings() -> BTreeMap<String, ColumnMapping> {
    use Normalizer::*;

    let mut customer = mapping(
        &["CustomerName", "CustName", "Customer", "Cust_Name"],
        "customer_name",
        ColumnType::Text,
        &[CustomerName],
    );
    customer.required = true;

    let mut phone = mapping(
        &["Phone", "PhoneNumber", "Phone_No"],
        "phone",
        ColumnType::Text,
        &[Phone],
    );
    phone.severity = Severity::Warning;

    let mut email = mapping(
        &["Email", "EmailAddress", "E_Mail"],
        "email",
        ColumnType::Text,
        &[Email],
    );
    email.severity = Severity::Warning;

    let mut active = mapping(
        &["Active", "IsActive"],
        "active",
        ColumnType::Boolean,
        &[],
    );
    active.default = Some("true".to_string());

    [
        ("customer_name", customer),
        (
            "grade",
            mapping(&["Grade", "PipeGrade", "Steel_Grade"], "grade", ColumnType::Text, &[Grade]),
        ),
        (
            "size",
            mapping(&["Size", "PipeSize", "OD"], "size", ColumnType::Text, &[Size]),
        ),
        (
            "connection",
            mapping(
                &["Connection", "ConnType", "Thread"],
                "connection",
                ColumnType::Text,
                &[Trim, Connection],
            ),
        ),
        (
            "work_order",
            mapping(
                &["WorkOrder", "WO", "WONumber", "Work_Order_No"],
                "work_order",
                ColumnType::Text,
                &[WorkOrder],
            ),
        ),
        ("phone", phone),
        ("email", email),
        (
            "order_date",
            mapping(&["OrderDate", "DateOrdered", "Order_Date"], "order_date", ColumnType::Date, &[]),
        ),
        (
            "quantity",
            mapping(&["Quantity", "Qty", "Joints"], "quantity", ColumnType::Integer, &[]),
        ),
        (
            "weight",
            mapping(&["Weight", "WeightPerFoot", "Wt"], "weight", ColumnType::Decimal, &[]),
        ),
        ("active", active),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Standard legacy tables and the counter-table declarations.
pub fn default_table_mappings() -> BTreeMap<String, TableMapping> {
    let mut tables: BTreeMap<String, TableMapping> = [
        ("tblCustomer", "customers"),
        ("tblWorkOrder", "work_orders"),
        ("tblInventory", "inventory"),
    ]
    .into_iter()
    .map(|(source, target)| (source.to_string(), TableMapping::table(target)))
    .collect();

    for (table, sequence) in COUNTER_TABLES {
        tables.insert(table.to_string(), TableMapping::counter(sequence));
    }
    tables
}
