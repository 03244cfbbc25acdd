use chrono::{DateTime, SecondsFormat, Utc};
use comfy_table::{presets, Table};
use std::cmp::Ordering;

use crate::kubemodel::Revision;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistoryLimit {
    All,
    Latest(usize),
}

/// One rendered line of deployment history
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    pub created_at: Option<DateTime<Utc>>,
    pub revision: String,
    pub user: String,
    pub image: String,
}

/// Owner references are matched by UID: ReplicaSet names only share a prefix with
/// their Deployment and may collide with unrelated workloads.
pub fn list_revisions_owned_by(revisions: Vec<Revision>, uid: &str) -> Vec<Revision> {
    revisions
        .into_iter()
        .filter(|revision| revision.owner_uids.iter().any(|owner| owner == uid))
        .collect()
}

fn compare_revision_numbers(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

/// Newest first; revisions without a timestamp sort last
fn newest_first(a: &Row, b: &Row) -> Ordering {
    match (&a.created_at, &b.created_at) {
        (Some(a), Some(b)) => b.cmp(a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| compare_revision_numbers(&b.revision, &a.revision))
}

pub fn format_and_sort(revisions: &[Revision], container: &str, limit: HistoryLimit) -> Vec<Row> {
    let mut rows: Vec<Row> = revisions
        .iter()
        .map(|revision| Row {
            created_at: revision.created_at,
            revision: revision.revision_number.clone(),
            user: revision.deployed_by.clone(),
            image: revision.image_for(container).unwrap_or_default().to_owned(),
        })
        .collect();
    rows.sort_by(newest_first);
    if let HistoryLimit::Latest(limit) = limit {
        rows.truncate(limit);
    }
    rows
}

pub fn render(rows: &[Row]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_header(vec!["DEPLOYED AT", "REVISION", "USER", "IMAGE"]);
    for row in rows {
        table.add_row(vec![
            row.created_at
                .map(|time| time.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default(),
            row.revision.clone(),
            row.user.clone(),
            row.image.clone(),
        ]);
    }
    table
}
