//! Azure Search query construction.
//!
//! Builds three request shapes: the user-facing search query (free text +
//! optional filter clauses chained with `and`), and two fixed-shape paginated
//! listing queries used internally (files of a document, records of a search
//! area).
//!
//! Filter values are interpolated verbatim into the OData filter expression —
//! no escaping is performed against the remote query syntax. This mirrors the
//! service dialect as deployed and is a known limitation for caller-supplied
//! strings.

use serde_json::{json, Value};

use crate::document::Document;

/// Default cap on the number of results a search request asks for.
pub const MAX_RESULTS: usize = 100;

/// Comma-separated list of fields the free-text query is matched against.
pub const SEARCH_FIELDS: &str = "id, title, content, description1, description2, filetext";

/// Opaque sentinel marking the start of a highlighted fragment.
///
/// Chosen to be unlikely to appear in normal text; rewritten into a
/// presentation wrapper by the result post-processor, never shown raw.
pub const HIGHLIGHT_START: &str = "@@HI_S@@";

/// Opaque sentinel marking the end of a highlighted fragment.
pub const HIGHLIGHT_END: &str = "@@HI_E@@";

/// Fields eligible for highlighting, each limited to 10 fragments.
pub const HIGHLIGHT_FIELDS: &[&str] = &["title", "content", "description1", "description2"];

/// Requested result ordering. Absent an explicit order, the service's
/// relevance ranking is preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn as_wire(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Access-context scope of a search request.
///
/// `Restricted` carries the caller's context sets grouped however the host
/// framework produced them (e.g. per course); the builder flattens and
/// deduplicates them, since the filter mechanism only accepts a flat list.
#[derive(Debug, Clone)]
pub enum ContextScope {
    Unrestricted,
    Restricted(Vec<Vec<i64>>),
}

impl ContextScope {
    /// Convenience constructor for a single flat context list.
    pub fn contexts(ids: Vec<i64>) -> Self {
        ContextScope::Restricted(vec![ids])
    }
}

/// Caller-supplied optional search criteria.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Free-text query string, passed through verbatim.
    pub q: String,
    /// Exact title phrase match.
    pub title: Option<String>,
    pub areaids: Vec<String>,
    pub courseids: Vec<i64>,
    pub userids: Vec<i64>,
    pub groupids: Vec<i64>,
    /// Modified-time lower bound (inclusive); 0 means unbounded.
    pub timestart: i64,
    /// Modified-time upper bound (exclusive); 0 means unbounded.
    pub timeend: i64,
    pub order: Option<SortOrder>,
}

/// Append a filter clause, prefixing ` and ` when prior clauses exist.
fn push_clause(filter: &mut String, clause: &str) {
    if !filter.is_empty() {
        filter.push_str(" and ");
    }
    filter.push_str(clause);
}

/// Flatten nested context sets into a deduplicated flat list, preserving
/// first-seen order.
fn flatten_contexts(groups: &[Vec<i64>]) -> Vec<i64> {
    let mut seen = std::collections::HashSet::new();
    let mut flat = Vec::new();
    for group in groups {
        for &id in group {
            if seen.insert(id) {
                flat.push(id);
            }
        }
    }
    flat
}

fn join_ids<T: ToString>(ids: &[T]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Membership test over a filterable field: `(search.in(field, '1,2,3'))`.
fn membership_clause<T: ToString>(field: &str, ids: &[T]) -> String {
    format!("(search.in({}, '{}'))", field, join_ids(ids))
}

/// Modified-time range clause; only the side(s) with a non-zero bound are
/// included.
fn time_range_clause(timestart: i64, timeend: i64) -> String {
    let mut clause = String::from("(");
    if timestart != 0 {
        clause.push_str(&format!("modified ge {}", timestart));
    }
    if timeend != 0 {
        if timestart != 0 {
            clause.push_str(" and ");
        }
        clause.push_str(&format!("modified lt {}", timeend));
    }
    clause.push(')');
    clause
}

/// Build the search request object for a filter set and context scope.
///
/// Clause order is fixed: contexts, title, area ids, course ids, user ids,
/// group ids, time range. Each clause after the first is joined with ` and `.
/// When no clause applies, the request carries no `filter` key at all.
///
/// Highlighting is not part of the bare query; the execute path decorates
/// the request with [`with_highlighting`] separately.
pub fn build_query(filters: &SearchFilters, scope: &ContextScope) -> Value {
    let mut query = json!({
        "search": filters.q,
        "searchFields": SEARCH_FIELDS,
        "top": MAX_RESULTS,
    });

    let mut filter = String::new();

    if let ContextScope::Restricted(groups) = scope {
        let contexts = flatten_contexts(groups);
        push_clause(&mut filter, &membership_clause("contextid", &contexts));
    }
    if let Some(ref title) = filters.title {
        push_clause(
            &mut filter,
            &format!("(search.ismatch('{}', 'title'))", title),
        );
    }
    if !filters.areaids.is_empty() {
        push_clause(&mut filter, &membership_clause("areaid", &filters.areaids));
    }
    if !filters.courseids.is_empty() {
        push_clause(
            &mut filter,
            &membership_clause("courseid", &filters.courseids),
        );
    }
    if !filters.userids.is_empty() {
        push_clause(&mut filter, &membership_clause("userid", &filters.userids));
    }
    if !filters.groupids.is_empty() {
        push_clause(
            &mut filter,
            &membership_clause("groupid", &filters.groupids),
        );
    }
    if filters.timestart != 0 || filters.timeend != 0 {
        push_clause(
            &mut filter,
            &time_range_clause(filters.timestart, filters.timeend),
        );
    }

    if !filter.is_empty() {
        query["filter"] = json!(filter);
    }

    if let Some(order) = filters.order {
        query["orderby"] = json!(format!("modified {}", order.as_wire()));
    }

    query
}

/// Decorate a search request with the highlight marker pair and the list of
/// highlightable fields.
pub fn with_highlighting(mut query: Value) -> Value {
    let fields = HIGHLIGHT_FIELDS
        .iter()
        .map(|f| format!("{}-10", f))
        .collect::<Vec<_>>()
        .join(",");

    query["highlightPreTag"] = json!(HIGHLIGHT_START);
    query["highlightPostTag"] = json!(HIGHLIGHT_END);
    query["highlight"] = json!(fields);
    query
}

/// Paginated listing query for the file documents indexed under an item.
pub fn files_query(document: &Document, start: usize, rows: usize) -> Value {
    let filter = format!(
        "(type eq 2) and (areaid eq '{}') and (parentid eq '{}')",
        document.areaid, document.id
    );

    json!({
        "top": rows,
        "skip": start,
        "filter": filter,
        "count": true,
    })
}

/// Paginated listing query for every record in a search area.
pub fn area_query(areaid: &str, start: usize, rows: usize) -> Value {
    json!({
        "top": rows,
        "skip": start,
        "filter": format!("areaid eq '{}'", areaid),
        "count": true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_query_has_no_filter_key() {
        let filters = SearchFilters {
            q: "*".to_string(),
            ..Default::default()
        };
        let query = build_query(&filters, &ContextScope::Unrestricted);

        let expected = json!({
            "search": "*",
            "searchFields": SEARCH_FIELDS,
            "top": 100,
        });
        assert_eq!(query, expected);
    }

    #[test]
    fn test_context_clause_only() {
        let filters = SearchFilters {
            q: "*".to_string(),
            ..Default::default()
        };
        let query = build_query(&filters, &ContextScope::contexts(vec![1, 2, 3]));
        assert_eq!(query["filter"], "(search.in(contextid, '1,2,3'))");
    }

    #[test]
    fn test_title_after_contexts() {
        let filters = SearchFilters {
            q: "*".to_string(),
            title: Some("forum".to_string()),
            ..Default::default()
        };
        let query = build_query(&filters, &ContextScope::contexts(vec![1, 2, 3]));
        assert_eq!(
            query["filter"],
            "(search.in(contextid, '1,2,3')) and (search.ismatch('forum', 'title'))"
        );
    }

    #[test]
    fn test_title_without_contexts_has_no_conjunction() {
        let filters = SearchFilters {
            q: "*".to_string(),
            title: Some("forum".to_string()),
            ..Default::default()
        };
        let query = build_query(&filters, &ContextScope::Unrestricted);
        assert_eq!(query["filter"], "(search.ismatch('forum', 'title'))");
    }

    #[test]
    fn test_full_clause_chain_order() {
        let filters = SearchFilters {
            q: "*".to_string(),
            title: Some("forum".to_string()),
            areaids: vec![
                "mod_assign-activity".to_string(),
                "mod_forum-activity".to_string(),
            ],
            courseids: vec![1, 2, 3, 4],
            timestart: 1_504_505_792,
            timeend: 1_504_505_795,
            ..Default::default()
        };
        let query = build_query(&filters, &ContextScope::contexts(vec![1, 2, 3]));

        let expected = concat!(
            "(search.in(contextid, '1,2,3'))",
            " and (search.ismatch('forum', 'title'))",
            " and (search.in(areaid, 'mod_assign-activity,mod_forum-activity'))",
            " and (search.in(courseid, '1,2,3,4'))",
            " and (modified ge 1504505792 and modified lt 1504505795)",
        );
        assert_eq!(query["filter"], expected);
    }

    #[test]
    fn test_user_and_group_clauses() {
        let filters = SearchFilters {
            q: "report".to_string(),
            userids: vec![5, 6],
            groupids: vec![9],
            ..Default::default()
        };
        let query = build_query(&filters, &ContextScope::Unrestricted);
        assert_eq!(
            query["filter"],
            "(search.in(userid, '5,6')) and (search.in(groupid, '9'))"
        );
    }

    #[test]
    fn test_one_sided_time_ranges() {
        let lower_only = SearchFilters {
            q: "*".to_string(),
            timestart: 100,
            ..Default::default()
        };
        let query = build_query(&lower_only, &ContextScope::Unrestricted);
        assert_eq!(query["filter"], "(modified ge 100)");

        let upper_only = SearchFilters {
            q: "*".to_string(),
            timeend: 200,
            ..Default::default()
        };
        let query = build_query(&upper_only, &ContextScope::Unrestricted);
        assert_eq!(query["filter"], "(modified lt 200)");
    }

    #[test]
    fn test_nested_contexts_flattened_and_deduplicated() {
        let filters = SearchFilters {
            q: "*".to_string(),
            ..Default::default()
        };
        let scope = ContextScope::Restricted(vec![vec![1, 2], vec![2, 3], vec![3, 1, 4]]);
        let query = build_query(&filters, &scope);
        assert_eq!(query["filter"], "(search.in(contextid, '1,2,3,4'))");
    }

    #[test]
    fn test_orderby_only_when_requested() {
        let mut filters = SearchFilters {
            q: "*".to_string(),
            ..Default::default()
        };

        let query = build_query(&filters, &ContextScope::Unrestricted);
        assert!(query.get("orderby").is_none());

        filters.order = Some(SortOrder::Asc);
        let query = build_query(&filters, &ContextScope::Unrestricted);
        assert_eq!(query["orderby"], "modified asc");

        filters.order = Some(SortOrder::Desc);
        let query = build_query(&filters, &ContextScope::Unrestricted);
        assert_eq!(query["orderby"], "modified desc");
    }

    #[test]
    fn test_highlighting_decoration() {
        let filters = SearchFilters {
            q: "*".to_string(),
            ..Default::default()
        };
        let query = with_highlighting(build_query(&filters, &ContextScope::Unrestricted));

        assert_eq!(query["highlightPreTag"], HIGHLIGHT_START);
        assert_eq!(query["highlightPostTag"], HIGHLIGHT_END);
        assert_eq!(
            query["highlight"],
            "title-10,content-10,description1-10,description2-10"
        );
    }

    #[test]
    fn test_files_query_shape() {
        let doc = Document::new_item("mod_assign-activity-12", 12, "mod_assign-activity");
        let query = files_query(&doc, 500, 500);

        assert_eq!(query["top"], 500);
        assert_eq!(query["skip"], 500);
        assert_eq!(query["count"], true);
        let expected = concat!(
            "(type eq 2)",
            " and (areaid eq 'mod_assign-activity')",
            " and (parentid eq 'mod_assign-activity-12')",
        );
        assert_eq!(query["filter"], expected);
    }

    #[test]
    fn test_area_query_shape() {
        let query = area_query("mod_forum-post", 0, 500);
        assert_eq!(query["top"], 500);
        assert_eq!(query["skip"], 0);
        assert_eq!(query["count"], true);
        assert_eq!(query["filter"], "areaid eq 'mod_forum-post'");
    }
}
