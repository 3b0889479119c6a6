//! Target column naming.

use crate::schema::TableInfo;
use crate::target::TargetColumn;

/// Generic identifier normalization for names with no explicit mapping:
/// lowercase, non-alphanumerics to `_`, repeats collapsed, edges trimmed.
pub fn normalize_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

/// Output columns of a table, in source order.
pub fn target_columns(table: &TableInfo) -> Vec<TargetColumn> {
    table
        .columns
        .iter()
        .map(|c| TargetColumn::new(c.name.clone(), c.target_type))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_identifier() {
        assert_eq!(normalize_identifier("Cust Name"), "cust_name");
        assert_eq!(normalize_identifier("  Order--Date# "), "order_date");
        assert_eq!(normalize_identifier("__Qty__"), "qty");
        assert_eq!(normalize_identifier("WO #"), "wo");
        assert_eq!(normalize_identifier("%%"), "");
    }
}
