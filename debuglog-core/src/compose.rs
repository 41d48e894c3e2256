use once_cell::sync::Lazy;
use regex_lite::Regex;

const DEBUG_MARKER: &str = "@status:debug";
const IDENTIFIER_FIELD: &str = "@car_id";

static SUPPRESSION_CLAUSE_REGEX: Lazy<Regex> =
    Lazy::new(|| compile_regex(r"\s*!\(@status:debug && @car_id:[^)\s]+\)"));

/// Negative clause that drops debug-level events for one car id.
pub fn suppression_clause(identifier: &str) -> String {
    format!("!({DEBUG_MARKER} && {IDENTIFIER_FIELD}:{identifier})")
}

/// `base` followed by one suppression clause per identifier, trimmed.
///
/// Clause order follows `identifiers`; only the set of clauses is meaningful
/// to the pipeline.
pub fn compose_query<I, S>(base: &str, identifiers: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let clauses = identifiers
        .into_iter()
        .map(|id| suppression_clause(id.as_ref()))
        .collect::<Vec<_>>()
        .join(" ");
    format!("{base} {clauses}").trim().to_string()
}

/// Removes clauses produced by [`suppression_clause`] from `query`.
///
/// Used when capturing the base query so clauses left behind by an earlier
/// process are not baked into it.
pub fn strip_suppression_clauses(query: &str) -> String {
    SUPPRESSION_CLAUSE_REGEX
        .replace_all(query, "")
        .trim()
        .to_string()
}

fn compile_regex(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(regex) => regex,
        // Panic is ok thanks to `strip_removes_only_generated_clauses`.
        Err(err) => panic!("invalid regex pattern `{pattern}`: {err}"),
    }
}
