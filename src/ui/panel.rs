// Operations panel view model
//
// Pure helpers between the registry and the panel widgets: grouping and
// ordering, plus the label formatting for rows. Kept free of any toolkit
// types so the whole module is unit-testable.

use std::time::{Duration, Instant};

use crate::models::operation::{Category, Operation, State};

/// Fixed display order for active-operation groups.
pub const CATEGORY_ORDER: [Category; 4] = [
    Category::Loading,
    Category::Install,
    Category::Update,
    Category::Maintenance,
];

/// One category section of the Active tab.
#[derive(Debug, Clone)]
pub struct ActiveGroup {
    pub category: Category,
    pub ops: Vec<Operation>,
}

/// Group active operations by category in [`CATEGORY_ORDER`], oldest-started
/// first within each group. Empty groups are omitted.
pub fn group_active(mut ops: Vec<Operation>) -> Vec<ActiveGroup> {
    ops.sort_by_key(|op| op.started_at);
    CATEGORY_ORDER
        .iter()
        .filter_map(|&category| {
            let group: Vec<Operation> = ops
                .iter()
                .filter(|op| op.category == category)
                .cloned()
                .collect();
            if group.is_empty() {
                None
            } else {
                Some(ActiveGroup {
                    category,
                    ops: group,
                })
            }
        })
        .collect()
}

/// Order history entries most recently finished first.
pub fn sort_history(mut ops: Vec<Operation>) -> Vec<Operation> {
    ops.sort_by(|a, b| b.ended_at.cmp(&a.ended_at));
    ops
}

/// Subtitle for an active-tab row: the status message, or the error for a
/// failed operation.
pub fn active_subtitle(op: &Operation) -> String {
    if op.state == State::Failed {
        format!("Error: {}", op.error_text().unwrap_or_default())
    } else {
        op.message.clone()
    }
}

/// Subtitle for a history row: "Completed • 42s • 5 mins ago".
pub fn history_subtitle(op: &Operation) -> String {
    let when = op
        .ended_at
        .map(format_time_ago)
        .unwrap_or_else(|| "Just now".to_string());
    format!(
        "{} • {} • {}",
        op.state.label(),
        format_duration(op.duration()),
        when
    )
}

/// Compact duration for display.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if duration < Duration::from_secs(1) {
        return "<1s".to_string();
    }
    if secs < 60 {
        return format!("{secs}s");
    }
    if secs < 3600 {
        return format!("{}m {}s", secs / 60, secs % 60);
    }
    format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
}

/// Relative "how long ago" label for a finish time.
pub fn format_time_ago(ended: Instant) -> String {
    let elapsed = ended.elapsed();
    let secs = elapsed.as_secs();
    if secs < 60 {
        return "Just now".to_string();
    }
    let mins = secs / 60;
    if mins < 60 {
        return if mins == 1 {
            "1 min ago".to_string()
        } else {
            format!("{mins} mins ago")
        };
    }
    let hours = mins / 60;
    if hours < 24 {
        return if hours == 1 {
            "1 hour ago".to_string()
        } else {
            format!("{hours} hours ago")
        };
    }
    let days = hours / 24;
    if days == 1 {
        "1 day ago".to_string()
    } else {
        format!("{days} days ago")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::operation::INDETERMINATE;
    use std::sync::Arc;

    fn op(id: u64, category: Category, started_offset: Duration) -> Operation {
        Operation {
            id,
            name: format!("Op {id}"),
            category,
            state: State::Active,
            started_at: Instant::now().checked_sub(started_offset).unwrap(),
            ended_at: None,
            progress: INDETERMINATE,
            message: String::new(),
            cancellable: false,
            error: None,
            retry: None,
        }
    }

    #[test]
    fn test_group_active_orders_categories_and_start_times() {
        let ops = vec![
            op(1, Category::Update, Duration::from_secs(10)),
            op(2, Category::Loading, Duration::from_secs(5)),
            op(3, Category::Update, Duration::from_secs(30)),
            op(4, Category::Install, Duration::from_secs(1)),
        ];

        let groups = group_active(ops);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].category, Category::Loading);
        assert_eq!(groups[1].category, Category::Install);
        assert_eq!(groups[2].category, Category::Update);
        // Oldest started first within a group.
        assert_eq!(groups[2].ops[0].id, 3);
        assert_eq!(groups[2].ops[1].id, 1);
    }

    #[test]
    fn test_group_active_empty() {
        assert!(group_active(Vec::new()).is_empty());
    }

    #[test]
    fn test_sort_history_newest_first() {
        let mut a = op(1, Category::Install, Duration::from_secs(60));
        a.ended_at = Some(Instant::now().checked_sub(Duration::from_secs(50)).unwrap());
        let mut b = op(2, Category::Install, Duration::from_secs(30));
        b.ended_at = Some(Instant::now().checked_sub(Duration::from_secs(5)).unwrap());

        let sorted = sort_history(vec![a, b]);
        assert_eq!(sorted[0].id, 2);
        assert_eq!(sorted[1].id, 1);
    }

    #[test]
    fn test_active_subtitle_shows_message_or_error() {
        let mut operation = op(1, Category::Install, Duration::ZERO);
        operation.message = "Downloading".to_string();
        assert_eq!(active_subtitle(&operation), "Downloading");

        operation.state = State::Failed;
        operation.error = Some(Arc::new(anyhow::anyhow!("disk full")));
        assert_eq!(active_subtitle(&operation), "Error: disk full");
    }

    #[test]
    fn test_history_subtitle() {
        let mut operation = op(1, Category::Install, Duration::from_secs(130));
        operation.state = State::Completed;
        operation.ended_at = Some(
            operation
                .started_at
                .checked_add(Duration::from_secs(125))
                .unwrap(),
        );

        let subtitle = history_subtitle(&operation);
        assert!(subtitle.starts_with("Completed • 2m 5s • "), "got {subtitle}");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(400)), "<1s");
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(192)), "3m 12s");
        assert_eq!(format_duration(Duration::from_secs(7500)), "2h 5m");
    }

    #[test]
    fn test_format_time_ago() {
        let now = Instant::now();
        assert_eq!(format_time_ago(now), "Just now");

        let back = |secs| now.checked_sub(Duration::from_secs(secs)).unwrap();
        assert_eq!(format_time_ago(back(90)), "1 min ago");
        assert_eq!(format_time_ago(back(60 * 12)), "12 mins ago");
        assert_eq!(format_time_ago(back(3700)), "1 hour ago");
        assert_eq!(format_time_ago(back(3600 * 5)), "5 hours ago");
        assert_eq!(format_time_ago(back(3600 * 24)), "1 day ago");
        assert_eq!(format_time_ago(back(3600 * 72)), "3 days ago");
    }
}
