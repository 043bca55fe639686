//! Reading the upstream service-data JSON into [`Ticket`]s.
//!
//! The tracker export is either an object keyed by repository, each holding
//! an array of tickets, or a flat array. Every raw ticket carries one field
//! per workflow state whose value is epoch seconds as a number, a numeric
//! string, or null.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::date_util::EpochSeconds;
use crate::diagnostics::{Diagnostic, DiagnosticSink, Series, SkipReason};
use crate::error::Result;
use crate::model::{Ticket, Workflow};

const TICKET_TYPE_INDEX: &str = "ticket_type";

#[derive(Debug, Clone, Deserialize)]
pub struct IndexEntry {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

/// A ticket as exported by the tracker, before any interpretation.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTicket {
    #[serde(default)]
    pub work_id: Option<Value>,
    #[serde(default)]
    pub github_repo: Option<String>,
    #[serde(default)]
    pub indexes: Vec<IndexEntry>,
    #[serde(default)]
    pub tags: Vec<Value>,
    /// State stamps and anything else the export carries.
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl RawTicket {
    pub fn id(&self) -> Option<String> {
        match self.work_id.as_ref()? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn ticket_type(&self) -> Option<String> {
        self.indexes
            .iter()
            .find(|i| i.name == TICKET_TYPE_INDEX)
            .and_then(|i| match &i.value {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ServiceData {
    ByRepo(BTreeMap<String, Vec<RawTicket>>),
    Flat(Vec<RawTicket>),
}

impl ServiceData {
    pub fn ticket_count(&self) -> usize {
        match self {
            ServiceData::ByRepo(repos) => repos.values().map(Vec::len).sum(),
            ServiceData::Flat(tickets) => tickets.len(),
        }
    }
}

/// Repositories and ticket types to leave out while ingesting.
#[derive(Debug, Clone, Default)]
pub struct IngestFilter {
    /// A repository is dropped when its name ends with any of these.
    pub removed_repos: Vec<String>,
    pub removed_ticket_types: BTreeSet<String>,
}

impl IngestFilter {
    pub fn repo_removed(&self, repo: &str) -> bool {
        self.removed_repos.iter().any(|r| repo.ends_with(r.as_str()))
    }

    pub fn type_removed(&self, ticket_type: Option<&str>) -> bool {
        ticket_type.is_some_and(|t| self.removed_ticket_types.contains(t))
    }
}

pub fn parse_service_data(json: &str) -> Result<ServiceData> {
    Ok(serde_json::from_str(json)?)
}

pub fn load_service_data(path: impl AsRef<Path>) -> Result<ServiceData> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)?;
    let data = parse_service_data(&json)?;
    log::info!("Loaded {} raw tickets from {}", data.ticket_count(), path.display());
    Ok(data)
}

/// Merge every repository into one ticket list, applying `filter`.
///
/// Only fields named after a `workflow` state are read as stamps. A stamp
/// that cannot be read is reported and treated as absent; a ticket without
/// an id is reported and dropped. Tickets without a `ticket_type` index are
/// kept whatever types the filter removes.
pub fn into_tickets(
    data: ServiceData,
    workflow: &Workflow,
    filter: &IngestFilter,
    sink: &dyn DiagnosticSink,
) -> Vec<Ticket> {
    let raw: Vec<(Option<String>, RawTicket)> = match data {
        ServiceData::ByRepo(repos) => repos
            .into_iter()
            .filter(|(repo, _)| {
                let removed = filter.repo_removed(repo);
                if removed {
                    log::debug!("Dropping repository {repo}");
                }
                !removed
            })
            .flat_map(|(repo, tickets)| tickets.into_iter().map(move |t| (Some(repo.clone()), t)))
            .collect(),
        ServiceData::Flat(tickets) => tickets
            .into_iter()
            .filter(|t| !t.github_repo.as_deref().is_some_and(|r| filter.repo_removed(r)))
            .map(|t| (None, t))
            .collect(),
    };

    let mut tickets = Vec::with_capacity(raw.len());
    for (repo_key, raw_ticket) in raw {
        let ticket_type = raw_ticket.ticket_type();
        if filter.type_removed(ticket_type.as_deref()) {
            continue;
        }
        let Some(id) = raw_ticket.id() else {
            sink.on_ticket_skipped(&Diagnostic::new("<unknown>", Series::Ingest, SkipReason::MissingId));
            continue;
        };

        let mut ticket = Ticket::new(id);
        ticket.repo = raw_ticket.github_repo.clone().or(repo_key);
        ticket.ticket_type = ticket_type;
        for state in workflow.states() {
            let Some(value) = raw_ticket.fields.get(state) else {
                continue;
            };
            match parse_timestamp(value) {
                Ok(ts) => {
                    ticket.timestamps.insert(state.clone(), ts);
                }
                Err(()) => sink.on_ticket_skipped(&Diagnostic::new(
                    ticket.id.clone(),
                    Series::Ingest,
                    SkipReason::UnparseableTimestamp {
                        state: state.clone(),
                        value: value.to_string(),
                    },
                )),
            }
        }
        tickets.push(ticket);
    }
    log::debug!("Ingested {} tickets", tickets.len());
    tickets
}

/// Epoch seconds from a number, a numeric string, or null. Fractional
/// seconds are truncated. Empty strings read as absent.
fn parse_timestamp(value: &Value) -> std::result::Result<Option<EpochSeconds>, ()> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .map(Some)
            .ok_or(()),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
                .map(Some)
                .ok_or(())
        }
        _ => Err(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{CollectingSink, NoopSink};
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "org/web": [
            {
                "work_id": "TRON-1",
                "github_repo": "org/web",
                "indexes": [{"name": "ticket_type", "value": "feature"}],
                "tags": [],
                "analysis_active": "1679356800",
                "in_progress": 1679443200,
                "delivered": null
            },
            {
                "work_id": "TRON-2",
                "indexes": [{"name": "ticket_type", "value": "spike"}],
                "delivered": "1679529600"
            }
        ],
        "org/legacy-api": [
            {"work_id": "TRON-3", "indexes": [], "delivered": 1679529600}
        ]
    }"#;

    fn filter(repos: &[&str], types: &[&str]) -> IngestFilter {
        IngestFilter {
            removed_repos: repos.iter().map(|s| s.to_string()).collect(),
            removed_ticket_types: types.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_parse_by_repo() {
        let data = parse_service_data(SAMPLE).unwrap();
        assert!(matches!(data, ServiceData::ByRepo(_)));
        assert_eq!(data.ticket_count(), 3);

        let tickets = into_tickets(data, &Workflow::default(), &IngestFilter::default(), &NoopSink);
        assert_eq!(tickets.len(), 3);
        let first = tickets.iter().find(|t| t.id == "TRON-1").unwrap();
        assert_eq!(first.timestamp("analysis_active"), Some(1_679_356_800));
        assert_eq!(first.timestamp("in_progress"), Some(1_679_443_200));
        assert_eq!(first.timestamp("delivered"), None);
        assert_eq!(first.ticket_type.as_deref(), Some("feature"));
        assert_eq!(first.repo.as_deref(), Some("org/web"));

        let second = tickets.iter().find(|t| t.id == "TRON-2").unwrap();
        // falls back to the repository key
        assert_eq!(second.repo.as_deref(), Some("org/web"));
    }

    #[test]
    fn test_parse_flat_array() {
        let data = parse_service_data(
            r#"[{"work_id": 42, "github_repo": "org/web", "in_progress": 10, "delivered": 20}]"#,
        )
        .unwrap();
        let tickets = into_tickets(data, &Workflow::default(), &IngestFilter::default(), &NoopSink);
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].id, "42");
        assert_eq!(tickets[0].delivered(&Workflow::default()), Some(20));
    }

    #[test]
    fn test_filters_repo_suffix_and_ticket_type() {
        let data = parse_service_data(SAMPLE).unwrap();
        let tickets = into_tickets(
            data,
            &Workflow::default(),
            &filter(&["legacy-api"], &["spike"]),
            &NoopSink,
        );
        let ids: Vec<&str> = tickets.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["TRON-1"]);
    }

    #[test]
    fn test_flat_array_repo_filter_uses_github_repo() {
        let data = parse_service_data(
            r#"[
                {"work_id": "A", "github_repo": "org/web", "delivered": 1},
                {"work_id": "B", "github_repo": "org/legacy-api", "delivered": 1},
                {"work_id": "C", "delivered": 1}
            ]"#,
        )
        .unwrap();
        let tickets = into_tickets(data, &Workflow::default(), &filter(&["legacy-api"], &[]), &NoopSink);
        let ids: Vec<&str> = tickets.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "C"]);
    }

    #[test]
    fn test_ticket_without_type_index_kept_under_type_filter() {
        let data = parse_service_data(
            r#"[
                {"work_id": "NO-INDEXES", "in_progress": 10, "delivered": 20},
                {"work_id": "EMPTY", "indexes": [], "delivered": 20},
                {"work_id": "OTHER", "indexes": [{"name": "team", "value": "core"}], "delivered": 20},
                {"work_id": "SPIKE", "indexes": [{"name": "ticket_type", "value": "spike"}], "delivered": 20}
            ]"#,
        )
        .unwrap();
        let sink = CollectingSink::new();
        let tickets = into_tickets(data, &Workflow::default(), &filter(&[], &["spike"]), &sink);
        let ids: Vec<&str> = tickets.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["NO-INDEXES", "EMPTY", "OTHER"]);
        assert!(tickets.iter().all(|t| t.ticket_type.is_none()));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_only_workflow_states_are_read() {
        let data = parse_service_data(r#"[{"work_id": "A", "todo": 1, "done": 2, "delivered": 3}]"#).unwrap();
        let wf = Workflow::new(["todo", "done"]).unwrap();
        let tickets = into_tickets(data, &wf, &IngestFilter::default(), &NoopSink);
        assert_eq!(tickets[0].timestamps.len(), 2);
        assert_eq!(tickets[0].delivered(&wf), Some(2));
    }

    #[test]
    fn test_bad_stamp_and_missing_id_reported() {
        let data = parse_service_data(
            r#"[
                {"work_id": "A", "in_progress": "yesterday", "delivered": "", "analysis_active": 5.9},
                {"indexes": [], "delivered": 1}
            ]"#,
        )
        .unwrap();
        let sink = CollectingSink::new();
        let tickets = into_tickets(data, &Workflow::default(), &IngestFilter::default(), &sink);

        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].timestamp("in_progress"), None);
        assert_eq!(tickets[0].timestamp("delivered"), None);
        assert_eq!(tickets[0].timestamp("analysis_active"), Some(5));

        let diagnostics = sink.take();
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(
            diagnostics[0].reason,
            SkipReason::UnparseableTimestamp {
                state: "in_progress".into(),
                value: "\"yesterday\"".into(),
            }
        );
        assert_eq!(diagnostics[1].reason, SkipReason::MissingId);
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            parse_service_data("{not json"),
            Err(crate::error::Error::Json(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let data = load_service_data(file.path()).unwrap();
        assert_eq!(data.ticket_count(), 3);

        assert!(matches!(
            load_service_data(file.path().with_extension("missing")),
            Err(crate::error::Error::Io(_))
        ));
    }
}
