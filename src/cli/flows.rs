use super::ui;
use crate::core::{AssetClass, DailyFlowRecord, FlowSummary, SyncOutcome, SyncRun, TickerFlowPoint};
use comfy_table::Cell;

/// Tickers present in any record, in the asset class's usual column order
/// with unrecognised tickers appended.
fn ticker_columns(asset_class: AssetClass, records: &[DailyFlowRecord]) -> Vec<String> {
    let mut columns: Vec<String> = asset_class
        .tickers()
        .iter()
        .filter(|t| records.iter().any(|r| r.ticker_flows.contains_key(**t)))
        .map(|t| t.to_string())
        .collect();
    for record in records {
        for ticker in record.ticker_flows.keys() {
            if !columns.contains(ticker) {
                columns.push(ticker.clone());
            }
        }
    }
    columns
}

pub fn flows_table(asset_class: AssetClass, records: &[DailyFlowRecord]) -> String {
    let tickers = ticker_columns(asset_class, records);
    let show_price = records.iter().any(|r| r.price.is_some());

    let mut table = ui::new_styled_table();
    let mut header = vec![ui::header_cell("Date"), ui::header_cell("Total")];
    header.extend(tickers.iter().map(|t| ui::header_cell(t)));
    if show_price {
        header.push(ui::header_cell("Price"));
    }
    table.set_header(header);

    for record in records {
        let mut row = vec![
            Cell::new(record.date.format("%Y-%m-%d")),
            ui::flow_cell(record.total_flow),
        ];
        row.extend(
            tickers
                .iter()
                .map(|t| ui::format_optional_cell(record.ticker_flow(t), ui::format_flow)),
        );
        if show_price {
            row.push(ui::format_optional_cell(record.price, |p| format!("{p:.2}")));
        }
        table.add_row(row);
    }

    let net: f64 = records.iter().map(|r| r.total_flow).sum();
    format!(
        "{} ETF flows (US$m)\n\n{table}\n\n{}: {}",
        ui::style_text(&asset_class.slug().to_uppercase(), ui::StyleType::Title),
        ui::style_text(&format!("Net over {} days", records.len()), ui::StyleType::TotalLabel),
        ui::style_flow(net)
    )
}

pub fn record_detail(record: &DailyFlowRecord) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Ticker"), ui::header_cell("Flow (US$m)")]);

    let mut ranked: Vec<(&String, &f64)> = record.ticker_flows.iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(a.1));
    for (ticker, flow) in ranked {
        table.add_row(vec![Cell::new(ticker), ui::flow_cell(*flow)]);
    }

    let mut output = format!(
        "{} ETF flows on {}\n\n{table}\n\n{}: {}",
        ui::style_text(&record.asset_class.slug().to_uppercase(), ui::StyleType::Title),
        record.date.format("%Y-%m-%d"),
        ui::style_text("Total", ui::StyleType::TotalLabel),
        ui::style_flow(record.total_flow)
    );
    if let Some(price) = record.price {
        output.push_str(&format!("\nPrice: {price:.2}"));
    }
    output
}

pub fn ticker_table(ticker: &str, points: &[TickerFlowPoint]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Date"), ui::header_cell("Flow (US$m)")]);
    for point in points {
        table.add_row(vec![
            Cell::new(point.date.format("%Y-%m-%d")),
            ui::flow_cell(point.flow_usd),
        ]);
    }
    let net: f64 = points.iter().map(|p| p.flow_usd).sum();
    format!(
        "{}\n\n{table}\n\n{}: {}",
        ui::style_text(ticker, ui::StyleType::Title),
        ui::style_text(&format!("Net over {} days", points.len()), ui::StyleType::TotalLabel),
        ui::style_flow(net)
    )
}

impl FlowSummary {
    pub fn display_as_report(&self) -> String {
        let mut stats = ui::new_styled_table();
        stats.set_header(vec![ui::header_cell("Metric"), ui::header_cell("Value")]);
        let period = match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => format!("{start} to {end}"),
            _ => "-".to_string(),
        };
        stats.add_row(vec![Cell::new("Period"), Cell::new(period)]);
        stats.add_row(vec![Cell::new("Trading days"), Cell::new(self.trading_days)]);
        stats.add_row(vec![Cell::new("Total inflow"), ui::flow_cell(self.total_inflow)]);
        stats.add_row(vec![Cell::new("Total outflow"), ui::flow_cell(-self.total_outflow)]);
        stats.add_row(vec![Cell::new("Net flow"), ui::flow_cell(self.net_flow)]);
        stats.add_row(vec![Cell::new("Average daily flow"), ui::flow_cell(self.avg_daily_flow)]);

        let mut tickers = ui::new_styled_table();
        tickers.set_header(vec![
            ui::header_cell("Ticker"),
            ui::header_cell("Cumulative flow (US$m)"),
        ]);
        for (ticker, total) in self.ranked_tickers() {
            tickers.add_row(vec![Cell::new(ticker), ui::flow_cell(total)]);
        }

        format!(
            "{} ETF summary\n\n{stats}\n\n{tickers}",
            ui::style_text(&self.etf_type.slug().to_uppercase(), ui::StyleType::Title)
        )
    }
}

impl SyncRun {
    pub fn display_as_report(&self) -> String {
        let status = match self.outcome {
            SyncOutcome::Success => ui::style_text("success", ui::StyleType::Inflow),
            SyncOutcome::Partial => ui::style_text("partial", ui::StyleType::TotalLabel),
            SyncOutcome::Failure => ui::style_text("failed", ui::StyleType::Error),
        };
        let mut output = format!(
            "{} sync {status} after {} attempt(s) in {:.1}s",
            self.asset_class.slug().to_uppercase(),
            self.attempts,
            self.elapsed_secs()
        );
        match &self.error {
            Some(error) => output.push_str(&format!("\n{}", ui::style_text(error, ui::StyleType::Error))),
            None => output.push_str(&format!(
                "\ninserted {}, updated {}, unchanged {}{}",
                self.inserted,
                self.updated,
                self.skipped,
                if self.rejected_rows > 0 {
                    ui::style_text(
                        &format!(", {} unparseable rows skipped", self.rejected_rows),
                        ui::StyleType::Subtle,
                    )
                } else {
                    String::new()
                }
            )),
        }
        output
    }
}
