//! PDF report rendering.
//!
//! One A4 page: title, identity block, a bordered three-column table of
//! income categories, the deductible total, and the refund estimate.
//! Everything is drawn with printpdf's built-in Helvetica, so no font
//! files are needed at runtime.

use crate::compute::{ComputationResult, TaxRules};
use crate::error::TaxShieldError;
use crate::stub::ExtractedStub;
use printpdf::*;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

pub const REPORT_TITLE: &str = "Forensic Tax Audit Report";
const SUBTITLE: &str = "Overtime, Double-Time & Tip Income Exemption Analysis";
const TABLE_HEADERS: [&str; 3] = ["Income Type", "Gross YTD", "Tax-Exempt Portion"];

const LEFT: f32 = 20.0;
const RIGHT: f32 = 190.0;
const COLUMNS: [f32; 3] = [20.0, 95.0, 140.0];
const ROW_HEIGHT: f32 = 10.0;

/// One table line, already formatted for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub label: String,
    pub gross: String,
    pub exempt: String,
}

/// Format dollars as `$1,234.56`.
pub fn format_currency(amount: f64) -> String {
    let cents = (amount * 100.0).round() as i64;
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    let whole = (cents / 100).to_string();

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{sign}${grouped}.{:02}", cents % 100)
}

/// The category rows plus the total row, as they appear in the table.
pub fn report_rows(stub: &ExtractedStub, result: &ComputationResult, rules: &TaxRules) -> Vec<ReportRow> {
    let a = &stub.amounts;
    vec![
        ReportRow {
            label: format!("Overtime ({}% exempt)", rules.overtime_percent()),
            gross: format_currency(a.overtime_ytd),
            exempt: format_currency(result.exempt_overtime),
        },
        ReportRow {
            label: format!("Double-Time ({}% exempt)", rules.doubletime_percent()),
            gross: format_currency(a.doubletime_ytd),
            exempt: format_currency(result.exempt_doubletime),
        },
        ReportRow {
            label: format!("Tips (100% up to {})", format_currency(rules.tip_cap)),
            gross: format_currency(a.tips_ytd),
            exempt: format_currency(result.exempt_tips),
        },
        ReportRow {
            label: "TOTAL DEDUCTIBLE INCOME".to_string(),
            gross: String::new(),
            exempt: format_currency(result.total_exempt),
        },
    ]
}

/// Render the report to PDF bytes.
pub fn render_report(
    stub: &ExtractedStub,
    result: &ComputationResult,
    rules: &TaxRules,
) -> Result<Vec<u8>, TaxShieldError> {
    let (doc, page1, layer1) = PdfDocument::new(REPORT_TITLE, Mm(210.0), Mm(297.0), "Layer 1");
    let layer = doc.get_page(page1).get_layer(layer1);
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| TaxShieldError::ReportFailed(format!("font: {e}")))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| TaxShieldError::ReportFailed(format!("font: {e}")))?;

    let black = Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None));
    let green = Color::Rgb(Rgb::new(0.0, 0.5, 0.0, None));

    let mut y = 275.0;
    layer.use_text(REPORT_TITLE, 18.0, Mm(LEFT), Mm(y), &bold);
    y -= 8.0;
    layer.use_text(SUBTITLE, 10.0, Mm(LEFT), Mm(y), &font);
    y -= 14.0;

    for line in [
        format!("Employee: {}", stub.employee_or_unknown()),
        format!("Employer: {}", stub.employer_or_unknown()),
        format!("Pay Period End: {}", stub.period_end_or_unknown()),
    ] {
        layer.use_text(line, 11.0, Mm(LEFT), Mm(y), &font);
        y -= 6.0;
    }
    y -= 8.0;

    // Table: header + three categories + total, ruled top and bottom of each row.
    let rows = report_rows(stub, result, rules);
    layer.set_outline_color(black.clone());
    layer.set_outline_thickness(0.6);

    let table_top = y;
    rule(&layer, table_top);
    let text_y = |row_top: f32| Mm(row_top - ROW_HEIGHT + 3.5);

    for (header, x) in TABLE_HEADERS.iter().zip(COLUMNS) {
        layer.use_text(*header, 11.0, Mm(x + 2.0), text_y(y), &bold);
    }
    y -= ROW_HEIGHT;
    rule(&layer, y);

    let last = rows.len() - 1;
    for (i, row) in rows.iter().enumerate() {
        let face = if i == last { &bold } else { &font };
        let cells = [row.label.as_str(), row.gross.as_str(), row.exempt.as_str()];
        for (cell, x) in cells.iter().zip(COLUMNS) {
            if !cell.is_empty() {
                layer.use_text(*cell, 10.0, Mm(x + 2.0), text_y(y), face);
            }
        }
        y -= ROW_HEIGHT;
        rule(&layer, y);
    }

    for x in COLUMNS.iter().copied().chain([RIGHT]) {
        layer.add_line(Line {
            points: vec![
                (Point::new(Mm(x), Mm(table_top)), false),
                (Point::new(Mm(x), Mm(y)), false),
            ],
            is_closed: false,
        });
    }

    y -= 16.0;
    layer.set_fill_color(green);
    layer.use_text(
        format!(
            "ESTIMATED REFUND INCREASE: {}",
            format_currency(result.refund_estimate)
        ),
        14.0,
        Mm(LEFT),
        Mm(y),
        &bold,
    );
    layer.set_fill_color(black);
    y -= 8.0;
    layer.use_text(
        format!(
            "Estimate assumes a {:.0}% marginal federal rate on the exempt total.",
            rules.refund_rate * 100.0
        ),
        8.0,
        Mm(LEFT),
        Mm(y),
        &font,
    );

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| TaxShieldError::ReportFailed(format!("save: {e}")))?;
    let bytes = buf
        .into_inner()
        .map_err(|e| TaxShieldError::ReportFailed(format!("buffer: {e}")))?;
    debug!("Rendered report: {} bytes", bytes.len());
    Ok(bytes)
}

fn rule(layer: &PdfLayerReference, y: f32) {
    layer.add_line(Line {
        points: vec![
            (Point::new(Mm(LEFT), Mm(y)), false),
            (Point::new(Mm(RIGHT), Mm(y)), false),
        ],
        is_closed: false,
    });
}

/// Write the report atomically: temp file in the target directory, then rename.
pub fn write_report(path: &Path, bytes: &[u8]) -> Result<(), TaxShieldError> {
    let io_err = |source| TaxShieldError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(io_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    info!("Report written to {}", path.display());
    Ok(())
}
