//! 투영 결과 출력.

use anyhow::{anyhow, Result};
use rust_decimal::Decimal;
use terminal_board::ProjectedView;
use terminal_core::{BoardRow, TableKind};

/// 출력 형식.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            _ => Err(anyhow!("Invalid format: {}. Use: table, json", s)),
        }
    }
}

pub fn render(view: &ProjectedView, kind: TableKind, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(format_table(view, kind)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(view)?),
    }
}

/// 빈 값은 `-`로 표시합니다 (0과 구분).
fn cell(value: Option<Decimal>) -> String {
    value
        .map(|v| v.round_dp(2).normalize().to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn format_table(view: &ProjectedView, kind: TableKind) -> String {
    let mut output = String::new();

    if kind == TableKind::Portfolio {
        output.push_str(&format!(
            "{:<12} {:>10} {:>10} {:>10} {:>14} {:>12} {:>9} {:>8}\n",
            "SYMBOL", "QTY", "AVG", "PRICE", "MKT_VALUE", "P/L", "P/L%", "WEIGHT"
        ));
        output.push_str(&"-".repeat(92));
    } else {
        output.push_str(&format!(
            "{:<12} {:>6} {:>10} {:>10} {:>10} {:>10} {:>8} {:>10}\n",
            "SYMBOL", "SESS", "REF", "MATCHED", "VOLUME", "CHANGE", "CHG%", "IDX_DIFF"
        ));
        output.push_str(&"-".repeat(82));
    }
    output.push('\n');

    let pinned = view.pinned.iter().map(|row| (true, row));
    let rows = view.rows.iter().map(|row| (false, row));
    for (is_pinned, row) in pinned.chain(rows) {
        let line = if kind == TableKind::Portfolio {
            portfolio_line(row)
        } else {
            board_line(row)
        };
        output.push_str(if is_pinned { "*" } else { " " });
        output.push_str(&line);
        output.push('\n');
    }

    if let Some(footer) = &view.footer {
        output.push_str(&"-".repeat(if kind == TableKind::Portfolio { 92 } else { 82 }));
        output.push('\n');
        output.push_str(&format!(
            "TOTAL ({} rows)  market value {}  cost {}  P/L {} ({}%)\n",
            footer.row_count,
            cell(Some(footer.total_market_value)),
            cell(Some(footer.total_cost)),
            cell(Some(footer.total_gain_loss)),
            cell(Some(footer.gain_loss_percent)),
        ));
    }

    output
}

fn board_line(row: &BoardRow) -> String {
    format!(
        "{:<11} {:>6} {:>10} {:>10} {:>10} {:>10} {:>8} {:>10}",
        row.key.to_string(),
        row.session.as_deref().unwrap_or("-"),
        cell(row.ref_price),
        cell(row.matched_price),
        row.matched_volume
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string()),
        cell(row.derived.price_change),
        cell(row.derived.price_change_percent),
        cell(row.derived.index_difference),
    )
}

fn portfolio_line(row: &BoardRow) -> String {
    let (volume, avg) = row
        .holding
        .as_ref()
        .map(|h| (h.volume.to_string(), cell(h.avg_price)))
        .unwrap_or_else(|| ("-".to_string(), "-".to_string()));
    format!(
        "{:<11} {:>10} {:>10} {:>10} {:>14} {:>12} {:>9} {:>8}",
        row.key.to_string(),
        volume,
        avg,
        cell(row.market_price()),
        cell(row.derived.market_value),
        cell(row.derived.gain_loss),
        cell(row.derived.gain_loss_percent),
        cell(row.derived.weight),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use terminal_core::{Footer, RowKey};

    fn view() -> ProjectedView {
        let mut pinned = BoardRow::new(RowKey::symbol("VNM"), 1);
        pinned.ref_price = Some(dec!(70));
        let mut row = BoardRow::new(RowKey::symbol("SSI"), 0);
        row.ref_price = Some(dec!(32.75));
        row.matched_price = Some(dec!(33));
        row.derived.price_change = Some(dec!(0.25));
        ProjectedView {
            pinned: vec![pinned],
            rows: vec![row],
            footer: Some(Footer {
                row_count: 2,
                ..Footer::default()
            }),
        }
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(OutputFormat::parse("JSON").unwrap(), OutputFormat::Json);
        assert!(OutputFormat::parse("csv").is_err());
    }

    #[test]
    fn test_table_marks_pinned_rows_first() {
        let text = render(&view(), TableKind::PriceBoard, OutputFormat::Table).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[2].starts_with("*VNM"));
        assert!(lines[3].starts_with(" SSI"));
        assert!(lines[3].contains("0.25"));
        assert!(text.contains("TOTAL (2 rows)"));
    }

    #[test]
    fn test_blank_values_render_as_dash() {
        assert_eq!(cell(None), "-");
        assert_eq!(cell(Some(Decimal::ZERO)), "0");
        assert_eq!(cell(Some(dec!(20.000))), "20");
    }

    #[test]
    fn test_json_output() {
        let text = render(&view(), TableKind::PriceBoard, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["pinned"].as_array().map(Vec::len), Some(1));
    }
}
