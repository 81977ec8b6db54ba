use serde_json::Value;

use terminal_size::{terminal_size, Width};

// Render list results (an array of objects under "results") as an ASCII table.
// Returns None when the value has no tabular shape; callers fall back to JSON.
pub fn render_table(val: &Value) -> Option<String> {
    render_table_width(val, terminal_width())
}

pub fn render_table_width(val: &Value, maxw: usize) -> Option<String> {
    let rows = val.get("results")?.as_array()?;
    if rows.is_empty() { return None; }
    let mut cols: Vec<String> = Vec::new();
    for r in rows {
        let obj = r.as_object()?;
        for k in obj.keys() {
            if !cols.contains(k) { cols.push(k.clone()); }
        }
    }
    // id first, the rest in key order
    if let Some(i) = cols.iter().position(|c| c == "id") {
        let id = cols.remove(i);
        cols.insert(0, id);
    }
    let cells: Vec<Vec<String>> = rows.iter()
        .map(|r| cols.iter().map(|c| to_cell_string(r.get(c).unwrap_or(&Value::Null))).collect())
        .collect();

    let mut widths: Vec<usize> = cols.iter().map(|c| c.chars().count().min(maxw)).collect();
    for r in &cells {
        for (i, cell) in r.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count().min(maxw));
        }
    }

    let sep = build_separator(&widths);
    let mut out = Vec::with_capacity(cells.len() + 5);
    out.push(sep.clone());
    out.push(build_row(&cols, &widths, false));
    out.push(sep.clone());
    for r in &cells { out.push(build_row(r, &widths, true)); }
    out.push(sep);
    out.push(format!("rows: {}", cells.len()));
    Some(out.into_iter().map(|l| fit_line_to_width(&l, maxw)).collect::<Vec<_>>().join("\n"))
}

fn to_cell_string(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn build_separator(widths: &[usize]) -> String {
    let mut s = String::from("+");
    for w in widths {
        s.push_str(&"-".repeat(*w + 2));
        s.push('+');
    }
    s
}

fn build_row(cells: &[String], widths: &[usize], align_numbers: bool) -> String {
    let mut s = String::from("|");
    for (i, w) in widths.iter().enumerate() {
        let cell = cells.get(i).map(String::as_str).unwrap_or("");
        let text = truncate(cell, *w);
        let pad = w.saturating_sub(text.chars().count());
        s.push(' ');
        if align_numbers && is_numeric_like(cell) {
            s.push_str(&" ".repeat(pad));
            s.push_str(&text);
        } else {
            s.push_str(&text);
            s.push_str(&" ".repeat(pad));
        }
        s.push_str(" |");
    }
    s
}

fn truncate(s: &str, max: usize) -> String {
    let len = s.chars().count();
    if len <= max { return s.to_string(); }
    if max <= 1 { return "…".to_string(); }
    s.chars().take(max - 1).collect::<String>() + "…"
}

fn is_numeric_like(s: &str) -> bool {
    let st = s.trim();
    !st.is_empty() && st.chars().all(|c| c.is_ascii_digit() || c == '-') && st.chars().any(|c| c.is_ascii_digit())
}

fn terminal_width() -> usize {
    match terminal_size() {
        Some((Width(w), _)) if w > 20 => w as usize,
        _ => 120,
    }
}

fn fit_line_to_width(s: &str, maxw: usize) -> String {
    if s.chars().count() <= maxw { s.to_string() } else { truncate(s, maxw) }
}
