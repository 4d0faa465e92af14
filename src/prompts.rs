//! Prompt for the pay-stub extraction call.
//!
//! Kept in one place so the JSON contract the parser in
//! [`crate::pipeline::extract`] relies on is visible next to the wording
//! that asks for it. Callers can override it via
//! [`crate::config::TaxShieldConfig::system_prompt`].

/// Field names the model is asked to return, in prompt order.
pub const STUB_FIELDS: [&str; 6] = [
    "employee_name",
    "employer_name",
    "pay_period_end",
    "ytd_overtime_income",
    "ytd_double_time_income",
    "ytd_tip_income",
];

/// Default extraction prompt.
pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"You are a Forensic Payroll Auditor. Extract the YEAR-TO-DATE totals from this pay stub image.

Return ONLY a raw JSON object, no prose and no code fences:
{
  "employee_name": "string or null",
  "employer_name": "string or null",
  "pay_period_end": "YYYY-MM-DD",
  "ytd_overtime_income": number or 0.0,
  "ytd_double_time_income": number or 0.0,
  "ytd_tip_income": number or 0.0
}

Rules:
- Use the YTD column, never the current-period column.
- Overtime means 1.5x premium pay; double time means 2.0x pay.
- Tips include cash tips, charged tips, and tip credits.
- If a line is absent from the stub, use 0.0.
- Numbers must be plain decimals without currency symbols or separators."#;
