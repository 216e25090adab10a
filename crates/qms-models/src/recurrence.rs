//! Recurrence and overdue rules
//!
//! Pure functions shared by the Postgres task repository (inside its
//! completion transaction) and the automation service.

use chrono::{Days, Months, NaiveDate};
use serde::Serialize;
use strum::{AsRefStr, Display};

use crate::task::{Frequency, Period, Task, TaskStatus};

/// Date of the occurrence following `date`, or `None` past the calendar range.
///
/// Month steps clamp to the last day of shorter months, so Jan 31 + 1 month
/// lands on the last day of February.
pub fn next_occurrence(frequency: Frequency, date: NaiveDate) -> Option<NaiveDate> {
    match frequency.period() {
        Period::Days(days) => date.checked_add_days(Days::new(days)),
        Period::Months(months) => date.checked_add_months(Months::new(months)),
    }
}

/// Why no instance was planned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SkipReason {
    /// Neither recurring nor part of a series
    NotRecurring,
    MissingFrequency,
    /// A not-started instance is already waiting
    OpenInstanceExists,
    /// Another instance already covers the next date or a later one
    LaterInstanceExists,
    /// Next date falls after the series end date
    SeriesEnded,
    DateOutOfRange,
}

/// Outcome of planning the next occurrence of a series
#[derive(Debug, Clone, PartialEq)]
pub enum NextOccurrence {
    /// Row to insert (no id yet)
    Create(Task),
    Skip(SkipReason),
}

impl NextOccurrence {
    pub fn is_create(&self) -> bool {
        matches!(self, NextOccurrence::Create(_))
    }
}

/// Plan the instance following a completed task.
///
/// `root` is the series template (the task itself when it has no parent) and
/// `existing_instances` every row already generated for that template.
/// `today` stands in for the base date when the task carries no dates.
pub fn plan_next_instance(
    task: &Task,
    root: &Task,
    existing_instances: &[Task],
    today: NaiveDate,
) -> NextOccurrence {
    if !task.is_recurring && task.parent_task_id.is_none() {
        return NextOccurrence::Skip(SkipReason::NotRecurring);
    }

    let Some(frequency) = root.frequency.or(task.frequency) else {
        return NextOccurrence::Skip(SkipReason::MissingFrequency);
    };

    // The task itself is listed when it is an instance of the series
    let siblings = || {
        existing_instances
            .iter()
            .filter(|instance| instance.id.is_none() || instance.id != task.id)
    };

    if siblings().any(|instance| instance.status == TaskStatus::NotStarted) {
        return NextOccurrence::Skip(SkipReason::OpenInstanceExists);
    }

    let base = task.due_date.or(task.start_date).unwrap_or(today);
    let Some(next_date) = next_occurrence(frequency, base) else {
        return NextOccurrence::Skip(SkipReason::DateOutOfRange);
    };

    // A task reopened after its successor was generated must not plan that
    // period a second time, whatever state the successor is in
    if siblings().any(|instance| instance.due_date.is_some_and(|due| due >= next_date)) {
        return NextOccurrence::Skip(SkipReason::LaterInstanceExists);
    }

    if root.end_date.is_some_and(|end| next_date > end) {
        return NextOccurrence::Skip(SkipReason::SeriesEnded);
    }

    let count = existing_instances
        .iter()
        .map(|instance| instance.recurrence_count_in_period)
        .max()
        .unwrap_or(0)
        + 1;

    NextOccurrence::Create(Task {
        id: None,
        title: root.title.clone(),
        description: root.description.clone(),
        department_id: root.department_id,
        assignee_id: root.assignee_id,
        created_by: root.created_by,
        priority: root.priority,
        due_date: Some(next_date),
        status: TaskStatus::NotStarted,
        is_recurring: true,
        frequency: Some(frequency),
        start_date: Some(next_date),
        end_date: root.end_date,
        parent_task_id: root.id,
        recurrence_count_in_period: count,
        approver_id: root.approver_id,
        approval_status: None,
        approval_reason: None,
        completed_at: None,
        created_at: None,
        updated_at: None,
    })
}

/// First instance of a freshly created series
pub fn first_instance(root: &Task) -> Task {
    let date = root.start_date.or(root.due_date);
    Task {
        id: None,
        status: TaskStatus::NotStarted,
        parent_task_id: root.id,
        recurrence_count_in_period: 1,
        start_date: date,
        due_date: root.due_date.or(date),
        approval_status: None,
        approval_reason: None,
        completed_at: None,
        created_at: None,
        updated_at: None,
        ..root.clone()
    }
}

/// Open, dated, non-template tasks whose due date has passed
pub fn is_overdue(task: &Task, today: NaiveDate) -> bool {
    !task.is_template() && task.status.is_open() && task.due_date.is_some_and(|due| due < today)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use strum::IntoEnumIterator;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn template(frequency: Frequency) -> Task {
        Task {
            id: Some(1),
            title: "Check fire extinguishers".into(),
            is_recurring: true,
            frequency: Some(frequency),
            start_date: Some(date(2026, 1, 31)),
            due_date: Some(date(2026, 1, 31)),
            assignee_id: Some(4),
            ..Default::default()
        }
    }

    fn instance(root: &Task, id: i64, count: i32, due: NaiveDate, status: TaskStatus) -> Task {
        Task {
            id: Some(id),
            parent_task_id: root.id,
            recurrence_count_in_period: count,
            due_date: Some(due),
            start_date: Some(due),
            status,
            ..root.clone()
        }
    }

    #[test]
    fn test_periods() {
        let d = date(2026, 1, 31);
        assert_eq!(next_occurrence(Frequency::Daily, d), Some(date(2026, 2, 1)));
        assert_eq!(next_occurrence(Frequency::Weekly, d), Some(date(2026, 2, 7)));
        assert_eq!(next_occurrence(Frequency::BiWeekly, d), Some(date(2026, 2, 14)));
        assert_eq!(next_occurrence(Frequency::Monthly, d), Some(date(2026, 2, 28)));
        assert_eq!(next_occurrence(Frequency::Quarterly, d), Some(date(2026, 4, 30)));
        assert_eq!(next_occurrence(Frequency::Annually, d), Some(date(2027, 1, 31)));
    }

    #[test]
    fn test_month_end_clamps_in_leap_year() {
        assert_eq!(
            next_occurrence(Frequency::Monthly, date(2028, 1, 31)),
            Some(date(2028, 2, 29))
        );
        assert_eq!(
            next_occurrence(Frequency::Annually, date(2028, 2, 29)),
            Some(date(2029, 2, 28))
        );
    }

    #[test]
    fn test_plan_after_completed_instance() {
        let root = template(Frequency::Weekly);
        let done = instance(&root, 2, 1, date(2026, 1, 31), TaskStatus::Completed);

        match plan_next_instance(&done, &root, &[done.clone()], date(2026, 2, 2)) {
            NextOccurrence::Create(next) => {
                assert_eq!(next.parent_task_id, Some(1));
                assert_eq!(next.recurrence_count_in_period, 2);
                assert_eq!(next.due_date, Some(date(2026, 2, 7)));
                assert_eq!(next.start_date, Some(date(2026, 2, 7)));
                assert_eq!(next.status, TaskStatus::NotStarted);
                assert_eq!(next.assignee_id, Some(4));
                assert!(next.id.is_none());
            }
            other => panic!("expected a new instance, got {other:?}"),
        }
    }

    #[test]
    fn test_skip_when_not_started_instance_exists() {
        let root = template(Frequency::Daily);
        let done = instance(&root, 2, 1, date(2026, 1, 31), TaskStatus::Completed);
        let waiting = instance(&root, 3, 2, date(2026, 2, 1), TaskStatus::NotStarted);

        assert_eq!(
            plan_next_instance(&done, &root, &[done.clone(), waiting], date(2026, 2, 1)),
            NextOccurrence::Skip(SkipReason::OpenInstanceExists)
        );
    }

    #[test]
    fn test_skip_when_later_instance_exists_in_any_status() {
        let mut root = template(Frequency::Monthly);
        root.approver_id = Some(9);
        // First instance reopened by a rejection after its successor was generated
        let reopened = instance(&root, 2, 1, date(2026, 1, 31), TaskStatus::Completed);

        for status in [TaskStatus::InProgress, TaskStatus::Overdue, TaskStatus::Completed] {
            let successor = instance(&root, 3, 2, date(2026, 2, 28), status);
            assert_eq!(
                plan_next_instance(&reopened, &root, &[reopened.clone(), successor], date(2026, 3, 1)),
                NextOccurrence::Skip(SkipReason::LaterInstanceExists),
                "successor in status {status}"
            );
        }
    }

    #[test]
    fn test_older_open_instance_does_not_block_successor() {
        let root = template(Frequency::Monthly);
        let reopened = instance(&root, 2, 1, date(2026, 1, 31), TaskStatus::InProgress);
        let done = instance(&root, 3, 2, date(2026, 2, 28), TaskStatus::Completed);

        match plan_next_instance(&done, &root, &[reopened, done.clone()], date(2026, 3, 1)) {
            NextOccurrence::Create(next) => {
                assert_eq!(next.due_date, Some(date(2026, 3, 28)));
                assert_eq!(next.recurrence_count_in_period, 3);
            }
            other => panic!("expected a new instance, got {other:?}"),
        }
    }

    #[test]
    fn test_skip_reason_wire_names() {
        assert_eq!(SkipReason::LaterInstanceExists.to_string(), "later-instance-exists");
        assert_eq!(SkipReason::SeriesEnded.as_ref(), "series-ended");
        assert_eq!(
            serde_json::to_value(SkipReason::OpenInstanceExists).unwrap(),
            serde_json::json!("open-instance-exists")
        );
    }

    #[test]
    fn test_skip_after_end_date() {
        let mut root = template(Frequency::Monthly);
        root.end_date = Some(date(2026, 2, 15));
        let done = instance(&root, 2, 1, date(2026, 1, 31), TaskStatus::Completed);

        assert_eq!(
            plan_next_instance(&done, &root, &[done.clone()], date(2026, 2, 1)),
            NextOccurrence::Skip(SkipReason::SeriesEnded)
        );
    }

    #[test]
    fn test_next_date_on_end_date_is_allowed() {
        let mut root = template(Frequency::Daily);
        root.end_date = Some(date(2026, 2, 1));
        let done = instance(&root, 2, 1, date(2026, 1, 31), TaskStatus::Completed);

        assert!(plan_next_instance(&done, &root, &[done.clone()], date(2026, 1, 31)).is_create());
    }

    #[test]
    fn test_one_off_task_is_not_planned() {
        let task = Task::new("One-off inspection");
        assert_eq!(
            plan_next_instance(&task, &task, &[], date(2026, 1, 1)),
            NextOccurrence::Skip(SkipReason::NotRecurring)
        );
    }

    #[test]
    fn test_base_date_falls_back_to_today() {
        let mut root = template(Frequency::Weekly);
        root.start_date = None;
        root.due_date = None;
        let mut done = instance(&root, 2, 1, date(2026, 1, 1), TaskStatus::Completed);
        done.due_date = None;
        done.start_date = None;

        match plan_next_instance(&done, &root, &[done.clone()], date(2026, 3, 2)) {
            NextOccurrence::Create(next) => assert_eq!(next.due_date, Some(date(2026, 3, 9))),
            other => panic!("expected a new instance, got {other:?}"),
        }
    }

    #[test]
    fn test_first_instance_inherits_template() {
        let mut root = template(Frequency::Quarterly);
        root.approver_id = Some(9);
        let first = first_instance(&root);
        assert_eq!(first.parent_task_id, Some(1));
        assert_eq!(first.recurrence_count_in_period, 1);
        assert_eq!(first.due_date, Some(date(2026, 1, 31)));
        assert_eq!(first.approver_id, Some(9));
        assert!(first.approval_status.is_none());
        assert!(!first.is_template());
    }

    #[test]
    fn test_overdue_rule() {
        let today = date(2026, 3, 10);
        let mut task = Task::new("Submit CAPA");
        task.due_date = Some(date(2026, 3, 9));
        assert!(is_overdue(&task, today));

        task.status = TaskStatus::InProgress;
        assert!(is_overdue(&task, today));

        task.status = TaskStatus::Overdue;
        assert!(!is_overdue(&task, today));

        task.status = TaskStatus::Completed;
        assert!(!is_overdue(&task, today));

        task.status = TaskStatus::NotStarted;
        task.due_date = Some(today);
        assert!(!is_overdue(&task, today));

        task.due_date = None;
        assert!(!is_overdue(&task, today));
    }

    #[test]
    fn test_templates_are_never_overdue() {
        let mut root = template(Frequency::Daily);
        root.due_date = Some(date(2020, 1, 1));
        assert!(!is_overdue(&root, date(2026, 1, 1)));
    }

    fn any_frequency() -> impl Strategy<Value = Frequency> {
        proptest::sample::select(Frequency::iter().collect::<Vec<_>>())
    }

    fn any_sibling_status() -> impl Strategy<Value = TaskStatus> {
        proptest::sample::select(TaskStatus::iter().collect::<Vec<_>>())
    }

    proptest! {
        #[test]
        fn prop_at_most_one_instance_at_next_period(
            frequency in any_frequency(),
            offset in 0i64..20_000,
            sibling in proptest::option::of((any_sibling_status(), -400i64..400)),
        ) {
            let due = date(2000, 1, 1) + chrono::Duration::days(offset);
            let root = template(frequency);
            let done = instance(&root, 2, 1, due, TaskStatus::Completed);
            let mut existing = vec![done.clone()];
            if let Some((status, shift)) = sibling {
                existing.push(instance(&root, 3, 2, due + chrono::Duration::days(shift), status));
            }
            let expected = next_occurrence(frequency, due);

            match plan_next_instance(&done, &root, &existing, due) {
                NextOccurrence::Create(next) => {
                    prop_assert_eq!(next.due_date, expected);
                    prop_assert!(next.due_date > Some(due));
                    prop_assert_eq!(next.recurrence_count_in_period, existing.len() as i32 + 1);
                    for other in &existing {
                        prop_assert_ne!(other.status, TaskStatus::NotStarted);
                        prop_assert!(other.due_date < next.due_date);
                    }
                }
                NextOccurrence::Skip(reason) => {
                    let (status, shift) = sibling.expect("a lone completed instance is always planned");
                    let sibling_due = due + chrono::Duration::days(shift);
                    match reason {
                        SkipReason::OpenInstanceExists => prop_assert_eq!(status, TaskStatus::NotStarted),
                        SkipReason::LaterInstanceExists => prop_assert!(Some(sibling_due) >= expected),
                        other => prop_assert!(false, "unexpected skip {other:?}"),
                    }
                }
            }
        }
    }
}
