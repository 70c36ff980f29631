//! Minimal CSV writer for ledger exports. Every value is quoted, and cells
//! starting with a formula character get a leading apostrophe so previews of
//! user-authored content cannot execute when opened in a spreadsheet.

fn is_formula_prefix(value: &str) -> bool {
    matches!(value.chars().next(), Some('=' | '+' | '-' | '@'))
}

fn quote(value: &str) -> String {
    let mut cell = value.replace('"', "\"\"");
    if is_formula_prefix(&cell) {
        cell.insert(0, '\'');
    }
    format!("\"{}\"", cell)
}

pub fn append_csv_row(buffer: &mut String, fields: &[String]) {
    let mut first = true;
    for field in fields {
        if !first {
            buffer.push(',');
        }
        first = false;
        buffer.push_str(&quote(field));
    }
    buffer.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_every_cell_and_joins_with_commas() {
        let mut out = String::new();
        append_csv_row(&mut out, &["a".into(), "b".into()]);
        assert_eq!(out, "\"a\",\"b\"\n");
    }

    #[test]
    fn doubles_embedded_quotes() {
        let mut out = String::new();
        append_csv_row(&mut out, &["say \"hi\"".into()]);
        assert_eq!(out, "\"say \"\"hi\"\"\"\n");
    }

    #[test]
    fn guards_formula_prefixes() {
        let mut out = String::new();
        append_csv_row(&mut out, &["=SUM(A1:A9)".into(), "+1".into(), "ok".into()]);
        assert_eq!(out, "\"'=SUM(A1:A9)\",\"'+1\",\"ok\"\n");
    }

    #[test]
    fn keeps_commas_and_newlines_inside_cells() {
        let mut out = String::new();
        append_csv_row(&mut out, &["line one\nline two, part".into()]);
        assert_eq!(out, "\"line one\nline two, part\"\n");
    }
}
