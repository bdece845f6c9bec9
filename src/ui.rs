//! Terminal output formatting for fatal errors.

/// Width of error box separators.
const ERROR_BOX_WIDTH: usize = 60;

/// Print an error box with a title and detail text.
///
/// Keeps fatal-error output consistent and visually distinct from the log
/// stream:
///
/// ```text
/// ============================================================
/// Backup run failed
/// ============================================================
///
/// dump failed for database 'app_db': ...
/// ```
pub fn print_error_box(title: &str, detail: &str) {
    eprintln!("\n{}", "=".repeat(ERROR_BOX_WIDTH));
    eprintln!("{title}");
    eprintln!("{}", "=".repeat(ERROR_BOX_WIDTH));

    if !detail.is_empty() {
        eprintln!("\n{detail}");
    }
}
