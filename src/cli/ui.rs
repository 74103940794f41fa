use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Defines different styles for text elements.
pub enum StyleType {
    Title,
    Subtle,
    Error,
}

/// Applies a consistent style to a string.
pub fn style_text(text: &str, style_type: StyleType) -> String {
    let styled = match style_type {
        StyleType::Title => style(text).bold().underlined(),
        StyleType::Subtle => style(text).dim(),
        StyleType::Error => style(text).red(),
    };
    styled.to_string()
}

/// Creates a new `comfy_table::Table` with standard styling.
pub fn new_styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Creates a styled header cell for a table.
pub fn header_cell(text: &str) -> Cell {
    Cell::new(text)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

/// Creates a cell for displaying percentage change with color coding.
pub fn change_cell(change: f64) -> Cell {
    let text = format!("{change:+.2}%");
    if change >= 0.0 {
        Cell::new(text)
            .fg(Color::Green)
            .set_alignment(CellAlignment::Right)
    } else {
        Cell::new(text)
            .fg(Color::Red)
            .set_alignment(CellAlignment::Right)
    }
}

/// Creates a cell for "N/A" values.
pub fn na_cell() -> Cell {
    Cell::new("N/A")
        .fg(Color::DarkGrey)
        .set_alignment(CellAlignment::Right)
}

/// Formats a price, keeping more precision for sub-dollar assets.
pub fn format_price(price: f64) -> String {
    if price.abs() < 1.0 {
        format!("${price:.6}")
    } else {
        format!("${price:.2}")
    }
}

/// Abbreviates large dollar amounts: `$1.32T`, `$4.56B`, `$7.89M`.
pub fn format_usd_abbrev(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let num = value.abs();
    if num >= 1e12 {
        format!("{sign}${:.2}T", num / 1e12)
    } else if num >= 1e9 {
        format!("{sign}${:.2}B", num / 1e9)
    } else if num >= 1e6 {
        format!("{sign}${:.2}M", num / 1e6)
    } else {
        format!("{sign}${num:.2}")
    }
}

/// Creates a spinner shown while market data is loading.
pub fn new_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
