//! HTML fixtures shaped like the portal's pages.
//!
//! Only the structure the scraper's selectors look at is reproduced.

/// Base URL used by the fixtures and most tests.
pub const BASE_URL: &str = "https://portal.test";

/// Well-formed sample VINs.
pub const VIN_A: &str = "1XKYD49X0LJ123456";
/// Well-formed sample VINs.
pub const VIN_B: &str = "1FUJGLDR5CLBP8834";
/// Well-formed sample VINs.
pub const VIN_C: &str = "3AKJHHDR7KSKA1234";

/// One roster row: VIN, unit number, year/make/model, status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterRow {
    /// VIN cell
    pub vin: String,
    /// Unit number cell
    pub unit_number: String,
    /// Combined year/make/model cell
    pub year_make_model: String,
    /// Status cell
    pub status: String,
}

impl RosterRow {
    /// Build a row from its four cells.
    pub fn new(vin: &str, unit_number: &str, year_make_model: &str, status: &str) -> Self {
        Self {
            vin: vin.to_string(),
            unit_number: unit_number.to_string(),
            year_make_model: year_make_model.to_string(),
            status: status.to_string(),
        }
    }
}

/// A typical in-service Kenworth row for `vin`.
pub fn sample_row(vin: &str) -> RosterRow {
    RosterRow::new(vin, "T-104", "2020 Kenworth T680", "Active")
}

/// One fault row: CSS class attribute and text content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultRow {
    /// Value of the `class` attribute
    pub class: String,
    /// Optional `style` attribute
    pub style: Option<String>,
    /// Row text
    pub text: String,
}

impl FaultRow {
    /// A `.fault-row` with an extra class.
    pub fn new(extra_class: &str, text: &str) -> Self {
        let class = if extra_class.is_empty() {
            "fault-row".to_string()
        } else {
            format!("fault-row {extra_class}")
        };
        Self {
            class,
            style: None,
            text: text.to_string(),
        }
    }

    /// Attach an inline style.
    #[must_use]
    pub fn with_style(mut self, style: &str) -> Self {
        self.style = Some(style.to_string());
        self
    }
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><title>{title}</title></head><body>{body}</body></html>"
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// The sign-in form.
pub fn login_page() -> String {
    login_form("")
}

/// The sign-in form with an error banner.
pub fn login_page_with_error(message: &str) -> String {
    login_form(&format!(
        r#"<div class="alert alert-danger" role="alert">{}</div>"#,
        escape(message)
    ))
}

fn login_form(banner: &str) -> String {
    page(
        "Sign in | PACCAR Solutions",
        &format!(
            r#"{banner}<form action="/login" method="post">
<label for="auth_key">Email</label><input id="auth_key" name="auth_key" type="text">
<label>Password</label><input name="password" type="password">
<button type="submit">Sign In</button>
</form>"#
        ),
    )
}

/// Authenticator-app challenge.
pub fn totp_challenge_page() -> String {
    page(
        "Two-step verification",
        r#"<form action="/login/mfa" method="post">
<p>Enter the 6-digit code from your authenticator app.</p>
<input name="code" placeholder="Authentication code" autocomplete="one-time-code">
<button type="submit">Verify</button>
</form>"#,
    )
}

/// Text-message challenge.
pub fn sms_challenge_page() -> String {
    page(
        "Two-step verification",
        r#"<form action="/login/mfa" method="post">
<p>We sent a code by <span>text message</span> to the number ending in 42.</p>
<input name="otp" inputmode="numeric">
<button type="submit">Verify</button>
</form>"#,
    )
}

/// E-mail challenge.
pub fn email_challenge_page() -> String {
    page(
        "Two-step verification",
        r#"<form action="/login/mfa" method="post">
<h2>verification code</h2>
<p>Check your inbox for a message from PACCAR Solutions.</p>
<input name="otp" inputmode="numeric">
<button type="submit">Verify</button>
</form>"#,
    )
}

/// Landing page after sign in.
pub fn dashboard_page() -> String {
    page(
        "Dashboard | PACCAR Solutions",
        r#"<nav><a href="/assets">Assets</a></nav><main class="dashboard"><h1>Fleet overview</h1></main>"#,
    )
}

/// A page the portal shows between sign in and the dashboard.
pub fn policy_page() -> String {
    page(
        "Terms of use",
        r#"<main><h1>Updated terms of use</h1><button class="accept">Accept</button></main>"#,
    )
}

/// Asset roster rendered as a table.
pub fn roster_table(rows: &[RosterRow]) -> String {
    let body: String = rows
        .iter()
        .map(|r| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td><span class=\"badge\">{}</span></td></tr>\n",
                escape(&r.vin),
                escape(&r.unit_number),
                escape(&r.year_make_model),
                escape(&r.status)
            )
        })
        .collect();
    page(
        "Assets",
        &format!(
            "<table class=\"assets\"><thead><tr><th>VIN</th><th>Unit</th><th>Vehicle</th><th>Status</th></tr></thead>\n<tbody>\n{body}</tbody></table>"
        ),
    )
}

/// Asset roster rendered as cards.
///
/// Alternates between the two card markups the portal has shipped so both
/// fallback selectors are exercised.
pub fn roster_cards(rows: &[RosterRow]) -> String {
    let cards: String = rows
        .iter()
        .enumerate()
        .map(|(i, r)| {
            if i % 2 == 0 {
                format!(
                    r#"<div class="asset-card"><span class="vin">{}</span><span class="unit-number">{}</span><div class="year-make-model">{}</div><span class="status">{}</span></div>
"#,
                    escape(&r.vin),
                    escape(&r.unit_number),
                    escape(&r.year_make_model),
                    escape(&r.status)
                )
            } else {
                format!(
                    r#"<div class="vehicle-card"><span data-vin="{0}">{0}</span><span class="unit">{1}</span><div class="vehicle-info">{2}</div></div>
"#,
                    escape(&r.vin),
                    escape(&r.unit_number),
                    escape(&r.year_make_model)
                )
            }
        })
        .collect();
    page("Assets", &format!("<div class=\"asset-list\">\n{cards}</div>"))
}

/// Roster with no vehicles.
pub fn empty_roster_page() -> String {
    page(
        "Assets",
        r#"<div class="asset-list"><p class="no-data">No assets found</p></div>"#,
    )
}

/// Diagnostics page listing fault rows.
pub fn diagnostics_page(rows: &[FaultRow]) -> String {
    let items: String = rows
        .iter()
        .map(|r| {
            let style = r
                .style
                .as_deref()
                .map(|s| format!(" style=\"{}\"", escape(s)))
                .unwrap_or_default();
            format!(
                "<div class=\"{}\"{style}>{}</div>\n",
                escape(&r.class),
                r.text
            )
        })
        .collect();
    page(
        "Diagnostics",
        &format!("<section class=\"fault-list\">\n{items}</section>"),
    )
}

/// Diagnostics page with the "no faults" banner.
pub fn no_faults_page() -> String {
    page(
        "Diagnostics",
        r#"<section><p class="no-faults">No active faults for this asset</p></section>"#,
    )
}

/// Diagnostics page whose "no faults" element carries unrelated text.
pub fn misleading_no_faults_page(rows: &[FaultRow]) -> String {
    let mut html = diagnostics_page(rows);
    html = html.replace(
        "<section class=\"fault-list\">",
        "<section class=\"fault-list\"><div class=\"no-data\">Last updated 5 minutes ago</div>",
    );
    html
}

/// A page that never shows any of the expected markers.
pub fn blank_page() -> String {
    page("Loading", "<div id=\"app\"></div>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roster_table_escapes_cells() {
        let html = roster_table(&[RosterRow::new(VIN_A, "<7>", "2019 Peterbilt 579", "Active")]);
        assert!(html.contains("&lt;7&gt;"));
        assert!(html.contains(VIN_A));
    }

    #[test]
    fn test_fault_row_classes() {
        assert_eq!(FaultRow::new("", "x").class, "fault-row");
        assert_eq!(FaultRow::new("critical", "x").class, "fault-row critical");
    }

    #[test]
    fn test_error_banner() {
        let html = login_page_with_error("Invalid email or password");
        assert!(html.contains("alert-danger"));
        assert!(html.contains("Invalid email or password"));
    }
}
