use super::ui;
use crate::core::config::AppConfig;
use crate::core::market::{ChangePeriod, SortDirection, SortKey};
use crate::core::state::{MarketsController, MarketsView};
use anyhow::Result;
use comfy_table::{Cell, CellAlignment};

#[derive(Debug, Clone, Default)]
pub struct MarketsOptions {
    /// Number of assets to list; falls back to the configured default.
    pub limit: Option<u32>,
    pub sort: Option<SortKey>,
    pub ascending: bool,
    pub period: Option<ChangePeriod>,
    pub search: Option<String>,
    /// Bypass the cache validity window.
    pub force_refresh: bool,
}

pub async fn run(
    controller: &MarketsController,
    config: &AppConfig,
    options: MarketsOptions,
) -> Result<()> {
    let spinner = ui::new_spinner("Loading market data...");
    if options.force_refresh {
        controller
            .refresh(options.limit.or(Some(config.default_limit)), true)
            .await;
    } else {
        controller.load_cached_if_fresh().await;
        // Top up when the cache holds fewer records than requested
        controller.refresh(options.limit, false).await;
    }
    spinner.finish_and_clear();

    if let Some(period) = options.period {
        controller.set_period(period).await;
    }

    if let Some(key) = options.sort {
        let wanted = if options.ascending {
            SortDirection::Ascending
        } else {
            SortDirection::Descending
        };
        // apply_sort toggles; a second call lands on the wanted direction
        if controller.apply_sort(key).await != wanted {
            controller.apply_sort(key).await;
        }
    }

    if let Some(query) = &options.search {
        controller.apply_filter(query).await;
    }

    let view = controller.view().await;
    if view.records.is_empty() {
        if view.query.is_empty() {
            println!(
                "{}",
                ui::style_text(
                    "No market data available. The provider may be rate limiting; try again shortly.",
                    ui::StyleType::Error
                )
            );
        } else {
            println!("No assets match '{}'.", view.query);
        }
        return Ok(());
    }

    println!("{}", render_table(&view));

    if let Some(last_fetch) = view.last_fetch {
        let footer = format!("Last updated: {}", last_fetch.format("%Y-%m-%d %H:%M:%S UTC"));
        println!("{}", ui::style_text(&footer, ui::StyleType::Subtle));
    }

    Ok(())
}

fn render_table(view: &MarketsView) -> String {
    let chevron = match view.direction {
        SortDirection::Ascending => "▲",
        SortDirection::Descending => "▼",
    };
    // The marker only appears once a sort was actually applied; the
    // provider's default ordering gets a plain header.
    let marked = |label: &str, key: SortKey| {
        if view.sort_applied && view.sort_key == key {
            ui::header_cell(&format!("{label} {chevron}"))
        } else {
            ui::header_cell(label)
        }
    };

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        marked("#", SortKey::MarketCapRank),
        ui::header_cell("Coin"),
        marked("Price", SortKey::Price),
        marked(&format!("Chg {}", view.period), SortKey::Change),
        ui::header_cell("Market Cap"),
    ]);

    for record in &view.records {
        let rank = record
            .market_cap_rank
            .map_or_else(ui::na_cell, |r| {
                Cell::new(r.to_string()).set_alignment(CellAlignment::Right)
            });

        let change = record
            .change_for(view.period)
            .map_or_else(ui::na_cell, ui::change_cell);

        table.add_row(vec![
            rank,
            Cell::new(format!(
                "{} ({})",
                record.name,
                record.symbol.to_uppercase()
            )),
            Cell::new(ui::format_price(record.current_price)).set_alignment(CellAlignment::Right),
            change,
            Cell::new(ui::format_usd_abbrev(record.market_cap))
                .set_alignment(CellAlignment::Right),
        ]);
    }

    table.to_string()
}
