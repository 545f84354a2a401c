//! Plain-text table rendering for result pages.

use sqlpane_core::Value;

const ELLIPSIS: &str = "...";

/// Render `rows` under `columns` as an aligned table.
///
/// `first_index` is the buffer index of `rows[0]` and is shown in a leading
/// `#` column. Cells wider than `max_width` characters are cut with `...`.
pub fn render_table(columns: &[String], rows: &[Vec<Value>], first_index: usize, max_width: usize) -> String {
    let mut header = vec!["#".to_string()];
    header.extend(columns.iter().map(|name| fit(name, max_width)));

    let body: Vec<Vec<String>> = rows
        .iter()
        .enumerate()
        .map(|(offset, row)| {
            let mut cells = vec![(first_index + offset + 1).to_string()];
            cells.extend(row.iter().map(|value| fit(&cell_text(value), max_width)));
            cells
        })
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|cell| cell.chars().count()).collect();
    for cells in &body {
        for (width, cell) in widths.iter_mut().zip(cells) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_line(&mut out, &header, &widths);
    let rule: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    push_line(&mut out, &rule, &widths);
    for cells in &body {
        push_line(&mut out, cells, &widths);
    }
    out
}

fn push_line(out: &mut String, cells: &[String], widths: &[usize]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect();
    out.push_str(line.join(" | ").trim_end());
    out.push('\n');
}

/// Single-line text for a cell.
fn cell_text(value: &Value) -> String {
    value
        .to_string()
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

fn fit(text: &str, max_width: usize) -> String {
    if text.chars().count() <= max_width {
        return text.to_string();
    }
    let keep = max_width.saturating_sub(ELLIPSIS.len());
    let mut cut: String = text.chars().take(keep).collect();
    cut.push_str(ELLIPSIS);
    cut
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use sqlpane_test_utils::generators::arb_result_set;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Header, rule and one line per row; no cell exceeds the width cap.
        #[test]
        fn prop_table_shape(
            (columns, rows) in arb_result_set(5, 20),
            max_width in 4usize..30,
        ) {
            let table = render_table(&columns, &rows, 0, max_width);
            prop_assert_eq!(table.lines().count(), rows.len() + 2);
            for line in table.lines().skip(2) {
                for cell in line.split(" | ").skip(1) {
                    prop_assert!(cell.trim_end().chars().count() <= max_width);
                }
            }
        }
    }
}
