//! Minimal reader for the quoted, comma-separated indicator export.

/// Splits one CSV line into cells.
///
/// Double quotes toggle quoting and are not part of the cell; commas inside
/// quotes are kept. A trailing comma yields a trailing empty cell.
pub fn split_cells(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut quoted = false;

    for ch in line.trim_end_matches(['\r', '\n']).chars() {
        match ch {
            '"' => quoted = !quoted,
            ',' if !quoted => cells.push(std::mem::take(&mut cell)),
            _ => cell.push(ch),
        }
    }
    cells.push(cell);
    cells
}
