use super::ui;
use crate::core::market::{ChangePeriod, MarketRecord};
use crate::core::state::MarketsController;
use anyhow::{Result, bail};
use comfy_table::Cell;

/// Displays one asset in detail, looked up by id or symbol.
pub async fn run(controller: &MarketsController, id: &str) -> Result<()> {
    let spinner = ui::new_spinner("Loading market data...");
    controller.load_cached_if_fresh().await;
    spinner.finish_and_clear();

    let view = controller.view().await;
    let needle = id.to_lowercase();
    let record = view
        .records
        .iter()
        .find(|r| r.id.to_lowercase() == needle || r.symbol.to_lowercase() == needle);

    match record {
        Some(record) => {
            println!("{}", render_detail(record));
            Ok(())
        }
        None => bail!(
            "No asset matching '{}' in the current listing. Try a larger limit with `markets --limit 500`.",
            id
        ),
    }
}

fn render_detail(record: &MarketRecord) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Field"),
        ui::header_cell("Value"),
    ]);

    let change_row = |period: ChangePeriod| {
        record
            .change_for(period)
            .map_or_else(ui::na_cell, ui::change_cell)
    };

    table.add_row(vec![Cell::new("Name"), Cell::new(&record.name)]);
    table.add_row(vec![
        Cell::new("Symbol"),
        Cell::new(record.symbol.to_uppercase()),
    ]);
    table.add_row(vec![
        Cell::new("Rank"),
        record
            .market_cap_rank
            .map_or_else(ui::na_cell, |r| Cell::new(r.to_string())),
    ]);
    table.add_row(vec![
        Cell::new("Price"),
        Cell::new(ui::format_price(record.current_price)),
    ]);
    table.add_row(vec![
        Cell::new("Market Cap"),
        Cell::new(ui::format_usd_abbrev(record.market_cap)),
    ]);
    table.add_row(vec![Cell::new("Change 24h"), change_row(ChangePeriod::Day)]);
    table.add_row(vec![Cell::new("Change 7d"), change_row(ChangePeriod::Week)]);
    table.add_row(vec![
        Cell::new("Change 30d"),
        change_row(ChangePeriod::Month),
    ]);
    table.add_row(vec![Cell::new("Image"), Cell::new(&record.image)]);

    format!(
        "{}\n\n{}",
        ui::style_text(&record.name, ui::StyleType::Title),
        table
    )
}
