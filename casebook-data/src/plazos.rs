//! Stage deadline (plazo) computation
//!
//! Pure functions over follow-up records. Deadlines count business days
//! (Monday to Friday); holidays are not modelled.

use casebook_core::{CaseId, Followup, PlazoSummary, ProcessStage, StageStatus};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::HashMap;

fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Date reached after `days` business days from `start`.
pub fn add_business_days(start: NaiveDate, days: u32) -> NaiveDate {
    let mut date = start;
    let mut remaining = days;
    while remaining > 0 {
        date += Duration::days(1);
        if is_business_day(date) {
            remaining -= 1;
        }
    }
    date
}

/// Signed number of business days from `from` to `to`: positive when `to`
/// is later, negative when it has already passed, zero on the same day.
pub fn business_days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    let (start, end, sign) = if to >= from {
        (from, to, 1)
    } else {
        (to, from, -1)
    };

    let mut count = 0;
    let mut date = start;
    while date < end {
        date += Duration::days(1);
        if is_business_day(date) {
            count += 1;
        }
    }
    sign * count
}

/// Summarise the current stage of one case from its follow-ups.
///
/// The current stage is the furthest stage reached; its start is the
/// earliest action recorded in that stage and its status that of the latest.
pub fn summarize(case_id: CaseId, followups: &[Followup], today: NaiveDate) -> PlazoSummary {
    let Some(current_stage) = followups.iter().map(|f| f.process_stage).max() else {
        return PlazoSummary::without_followups(case_id);
    };

    let in_stage: Vec<&Followup> = followups
        .iter()
        .filter(|f| f.process_stage == current_stage)
        .collect();

    let stage_started = in_stage.iter().map(|f| f.action_date).min();
    let stage_status = in_stage
        .iter()
        .max_by_key(|f| (f.action_date, f.created_at))
        .map(|f| f.stage_status);

    let due_date =
        stage_started.map(|start| add_business_days(start, current_stage.deadline_business_days()));
    let business_days_remaining = due_date.map(|due| business_days_between(today, due));

    let overdue = match (business_days_remaining, stage_status) {
        (_, Some(StageStatus::Completada)) => false,
        (_, Some(StageStatus::Vencida)) => true,
        (Some(remaining), _) => remaining < 0,
        (None, _) => false,
    };

    PlazoSummary {
        case_id,
        current_stage: Some(current_stage),
        stage_status,
        stage_started,
        due_date,
        business_days_remaining,
        overdue,
        followup_count: followups.len(),
    }
}

/// Summaries for every requested case; cases without follow-ups get an
/// empty summary and follow-ups of unrequested cases are ignored.
pub fn summarize_many(
    case_ids: &[CaseId],
    followups: Vec<Followup>,
    today: NaiveDate,
) -> HashMap<CaseId, PlazoSummary> {
    let mut by_case: HashMap<CaseId, Vec<Followup>> = HashMap::new();
    for followup in followups {
        by_case
            .entry(followup.case_id.clone())
            .or_default()
            .push(followup);
    }

    case_ids
        .iter()
        .map(|id| {
            let records = by_case.get(id).map(Vec::as_slice).unwrap_or(&[]);
            (id.clone(), summarize(id.clone(), records, today))
        })
        .collect()
}

/// Stage a case is expected to move to once its current stage completes.
pub fn next_stage(summary: &PlazoSummary) -> Option<ProcessStage> {
    match summary.current_stage {
        None => Some(ProcessStage::Reporte),
        Some(stage) => stage.next(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casebook_core::FollowupId;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn followup(id: &str, stage: ProcessStage, on: NaiveDate, status: StageStatus) -> Followup {
        Followup {
            id: FollowupId::new(id),
            case_id: CaseId::new("c1"),
            tenant_id: None,
            action_date: on,
            action_type: "Entrevista".to_string(),
            process_stage: stage,
            stage_status: status,
            detail: None,
            observations: None,
            responsible: None,
            created_at: None,
        }
    }

    #[test]
    fn test_add_business_days_skips_weekends() {
        // 2024-03-08 is a Friday
        assert_eq!(add_business_days(date(2024, 3, 8), 1), date(2024, 3, 11));
        assert_eq!(add_business_days(date(2024, 3, 8), 0), date(2024, 3, 8));
        assert_eq!(add_business_days(date(2024, 3, 4), 10), date(2024, 3, 18));
    }

    #[test]
    fn test_business_days_between_is_signed() {
        assert_eq!(business_days_between(date(2024, 3, 8), date(2024, 3, 11)), 1);
        assert_eq!(business_days_between(date(2024, 3, 11), date(2024, 3, 8)), -1);
        assert_eq!(business_days_between(date(2024, 3, 9), date(2024, 3, 10)), 0);
        assert_eq!(business_days_between(date(2024, 3, 4), date(2024, 3, 4)), 0);
    }

    #[test]
    fn test_summary_without_followups() {
        let summary = summarize(CaseId::new("c1"), &[], date(2024, 3, 4));
        assert_eq!(summary.current_stage, None);
        assert!(!summary.overdue);
        assert_eq!(next_stage(&summary), Some(ProcessStage::Reporte));
    }

    #[test]
    fn test_summary_uses_furthest_stage() {
        let records = vec![
            followup("f1", ProcessStage::Reporte, date(2024, 3, 1), StageStatus::Completada),
            followup("f2", ProcessStage::Investigacion, date(2024, 3, 4), StageStatus::EnCurso),
            followup("f3", ProcessStage::Investigacion, date(2024, 3, 6), StageStatus::EnCurso),
        ];
        let summary = summarize(CaseId::new("c1"), &records, date(2024, 3, 11));

        assert_eq!(summary.current_stage, Some(ProcessStage::Investigacion));
        assert_eq!(summary.stage_started, Some(date(2024, 3, 4)));
        assert_eq!(summary.due_date, Some(date(2024, 3, 18)));
        assert_eq!(summary.business_days_remaining, Some(5));
        assert!(!summary.overdue);
        assert_eq!(summary.followup_count, 3);
    }

    #[test]
    fn test_summary_overdue() {
        let records = vec![followup(
            "f1",
            ProcessStage::Reporte,
            date(2024, 3, 1),
            StageStatus::EnCurso,
        )];
        // due 2024-03-05 (two business days after Friday 1st)
        let summary = summarize(CaseId::new("c1"), &records, date(2024, 3, 7));
        assert_eq!(summary.due_date, Some(date(2024, 3, 5)));
        assert_eq!(summary.business_days_remaining, Some(-2));
        assert!(summary.overdue);
    }

    #[test]
    fn test_completed_stage_is_never_overdue() {
        let records = vec![followup(
            "f1",
            ProcessStage::Cierre,
            date(2024, 1, 1),
            StageStatus::Completada,
        )];
        let summary = summarize(CaseId::new("c1"), &records, date(2024, 6, 1));
        assert!(!summary.overdue);
        assert_eq!(next_stage(&summary), None);
    }

    #[test]
    fn test_summarize_many_covers_every_requested_case() {
        let mut other = followup(
            "f9",
            ProcessStage::Reporte,
            date(2024, 3, 1),
            StageStatus::EnCurso,
        );
        other.case_id = CaseId::new("c2");
        let ids = vec![CaseId::new("c1"), CaseId::new("c3")];

        let map = summarize_many(
            &ids,
            vec![
                followup("f1", ProcessStage::Reporte, date(2024, 3, 1), StageStatus::EnCurso),
                other,
            ],
            date(2024, 3, 4),
        );

        assert_eq!(map.len(), 2);
        assert_eq!(map[&CaseId::new("c1")].followup_count, 1);
        assert_eq!(map[&CaseId::new("c3")].followup_count, 0);
        assert!(!map.contains_key(&CaseId::new("c2")));
    }
}
