//! XPath locators for the pipelines dashboard.
//!
//! Pipeline and stage names are matched case-insensitively by lowercasing
//! both sides: the argument in Rust, the page text with `translate()`.

use crate::core::InstanceNumber;
use crate::driver::Locator;
use chrono::NaiveDate;

/// Dashboard tab strip, hidden after load so it cannot cover pipeline cards.
pub const DASHBOARD_TABS: &str = ".dashboard-tabs";

/// Script hiding [`DASHBOARD_TABS`].
pub const HIDE_TABS_SCRIPT: &str = "document.querySelector('.dashboard-tabs').style.display = 'none'";

/// Jobs tab on the stage detail page.
pub const JOBS_TAB: &str = "//li/a[contains(text(), 'Jobs')]";

/// Rerun button on the stage detail jobs tab.
pub const RERUN_FAILED: &str = "//span[contains(text(), 'RERUN FAILED')]/ancestor::button";

/// Text the stage detail page title contains.
pub const STAGE_DETAIL_TITLE: &str = "Stage Detail";

/// Quotes `value` as an XPath 1.0 string literal.
///
/// XPath has no escapes, so values holding both quote kinds are split into a
/// `concat()` of pieces.
#[must_use]
pub fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{value}'");
    }
    if !value.contains('"') {
        return format!("\"{value}\"");
    }

    let parts: Vec<String> = value.split('\'').map(|p| format!("'{p}'")).collect();
    format!("concat({})", parts.join(", \"'\", "))
}

/// Lowercases `subject` inside an XPath expression.
#[must_use]
pub fn lower(subject: &str) -> String {
    format!("translate({subject}, 'ABCDEFGHIJKLMNOPQRSTUVWXYZ', 'abcdefghijklmnopqrstuvwxyz')")
}

/// The run date label the dashboard prints on a pipeline card.
#[must_use]
pub fn run_date_label(date: NaiveDate) -> String {
    date.format("on %-d %b, %Y").to_string()
}

fn heading(pipeline: &str, instance: &InstanceNumber) -> String {
    format!(
        "//h3[contains({}, {}) and contains(text(), {})]",
        lower("text()"),
        xpath_literal(&pipeline.to_lowercase()),
        xpath_literal(instance.as_str())
    )
}

fn stage_link(state: &str, stage: &str) -> String {
    format!(
        "//a[@class='pipeline_stage {state}' and contains({}, {})]",
        lower("@title"),
        xpath_literal(&stage.to_lowercase())
    )
}

/// Trigger button of a pipeline card.
#[must_use]
pub fn play_button(pipeline: &str, instance: &InstanceNumber) -> Locator {
    Locator::xpath(format!(
        "{}/ancestor::div[@class='pipeline_header']//button[@title='Trigger Pipeline']",
        heading(pipeline, instance)
    ))
}

/// Every stage element of a pipeline card, in declared order.
#[must_use]
pub fn stages(pipeline: &str, instance: &InstanceNumber) -> Locator {
    Locator::xpath(format!(
        "{}/ancestor::div[@class='pipeline']//*[contains(@class, 'pipeline_stage ')]",
        heading(pipeline, instance)
    ))
}

/// Link of a failed stage.
#[must_use]
pub fn failed_stage(pipeline: &str, instance: &InstanceNumber, stage: &str) -> Locator {
    Locator::xpath(format!(
        "{}/ancestor::div[@class='pipeline']{}",
        heading(pipeline, instance),
        stage_link("failed", stage)
    ))
}

/// Link of a passed stage on a card whose run is dated `date`.
#[must_use]
pub fn passed_stage_on(pipeline: &str, instance: &InstanceNumber, stage: &str, date: NaiveDate) -> Locator {
    Locator::xpath(format!(
        "//div[contains(text(), {})]/ancestor::div[@class='pipeline']{}/ancestor::div[@class='pipeline']{}",
        xpath_literal(&run_date_label(date)),
        heading(pipeline, instance),
        stage_link("passed", stage)
    ))
}

/// "Play with options" button of the pipeline that configures branch builds.
#[must_use]
pub fn play_with_options(pipeline: &str) -> Locator {
    Locator::xpath(format!(
        "//h3[contains(text(), {})]/ancestor::div[@class='pipeline_header']//button[contains(@class, 'play_with_options')]",
        xpath_literal(pipeline)
    ))
}

/// Environment variables tab of the trigger modal.
#[must_use]
pub fn environment_variables_tab() -> Locator {
    Locator::xpath("//div[contains(@class, 'new-modal-container')]//li[contains(text(), 'Environment variables')]")
}

/// Branch input of the trigger modal.
#[must_use]
pub fn branch_input() -> Locator {
    Locator::xpath("//dt[@class='name' and contains(text(), 'Branch')]/following-sibling::dd/input")
}

/// Trigger button of the trigger modal.
#[must_use]
pub fn modal_trigger_button() -> Locator {
    Locator::xpath("//div[contains(@class, 'new-modal-container')]//button[contains(text(), 'Trigger Pipeline')]")
}

/// Heading of a branch's build pipeline.
#[must_use]
pub fn build_heading(prefix: &str, branch: &str) -> Locator {
    Locator::xpath(format!(
        "//h3[contains(text(), {}) and contains({}, {})]",
        xpath_literal(prefix),
        lower("text()"),
        xpath_literal(&branch.to_lowercase())
    ))
}

/// Every pipeline heading of an instance.
#[must_use]
pub fn instance_headings(instance: &InstanceNumber) -> Locator {
    Locator::xpath(format!("//h3[contains(text(), {})]", xpath_literal(instance.as_str())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xpath_literal() {
        assert_eq!(xpath_literal("deploy"), "'deploy'");
        assert_eq!(xpath_literal("it's"), "\"it's\"");
        assert_eq!(xpath_literal(r#"a'b"c"#), r#"concat('a', "'", 'b"c')"#);
    }

    #[test]
    fn test_run_date_label() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(run_date_label(date), "on 7 Mar, 2024");
    }

    #[test]
    fn test_heading_lowercases_pipeline() {
        let locator = play_button("DeployDBs", &InstanceNumber::from("42"));
        let xpath = locator.expression();

        assert!(xpath.contains("'deploydbs'"));
        assert!(xpath.contains("contains(text(), '42')"));
        assert!(xpath.ends_with("//button[@title='Trigger Pipeline']"));
    }

    #[test]
    fn test_passed_stage_on_is_date_scoped() {
        let date = NaiveDate::from_ymd_opt(2024, 11, 21).unwrap();
        let locator = passed_stage_on("buildse", &InstanceNumber::from("3"), "Compile", date);

        assert!(locator.expression().starts_with("//div[contains(text(), 'on 21 Nov, 2024')]"));
        assert!(locator.expression().contains("@class='pipeline_stage passed'"));
        assert!(locator.expression().contains("'compile'"));
    }
}
