use chrono::{DateTime, TimeZone, Utc};
use tally_core::config::ProjectConfig;
use tally_core::drilldown::{Filter, Metric};
use tally_core::kpi::{KpiKey, KpiQuery, KpiRow};
use tally_core::model::{ItemUpdate, NewItem, NewStage, Quarter, Stage, WorkItem};
use tally_core::rules::{Bucket, InProgressMode};
use tally_core::{Store, WriteMode};

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 8, 30, 0).unwrap()
}

struct Board {
    store: Store,
    backlog: Stage,
    todo_review: Stage,
    review: Stage,
    done: Stage,
    archive_2024: Stage,
    archive_2023: Stage,
}

fn board(config: &ProjectConfig) -> Board {
    let store = Store::open_in_memory(config).expect("open store");
    let backlog = store.add_stage(NewStage::named("Backlog").at(1)).unwrap();
    let todo_review = store.add_stage(NewStage::named("To Do Review").at(2)).unwrap();
    let review = store.add_stage(NewStage::named("Review").at(3)).unwrap();
    let done = store
        .add_stage(NewStage::named("Done").closed(true).at(4))
        .unwrap();
    let archive_2024 = store.add_stage(NewStage::named("2024 Archive").at(5)).unwrap();
    let archive_2023 = store
        .add_stage(NewStage::named("2023 Arşiv").closed(true).at(6))
        .unwrap();
    Board {
        store,
        backlog,
        todo_review,
        review,
        done,
        archive_2024,
        archive_2023,
    }
}

fn create(board: &Board, title: &str, stage: &Stage, assignees: &[&str], now: DateTime<Utc>) -> WorkItem {
    let mut new = NewItem::titled(title).in_stage(stage.id);
    for assignee in assignees {
        new = new.assigned_to(*assignee);
    }
    board
        .store
        .create_item_at(new, &WriteMode::user("lead"), now)
        .expect("create item")
}

fn row<'a>(rows: &'a [KpiRow], assignee: Option<&str>, year: Option<i32>, quarter: Option<Quarter>) -> &'a KpiRow {
    rows.iter()
        .find(|row| {
            row.key.assignee.as_deref() == assignee && row.key.year == year && row.key.quarter == quarter
        })
        .unwrap_or_else(|| panic!("no row for {assignee:?} {year:?} {quarter:?} in {rows:?}"))
}

#[test]
fn three_item_example() {
    let config = ProjectConfig::default();
    let b = board(&config);
    let now = at(2024, 4, 10);
    create(&b, "A", &b.backlog, &["ayse"], now);
    create(&b, "B", &b.todo_review, &["ayse"], now);
    create(&b, "C", &b.archive_2024, &["ayse"], now);

    let rows = b.store.kpi_rows(&KpiQuery::default()).unwrap();
    let q2 = row(&rows, Some("ayse"), Some(2024), Some(Quarter::Q2));
    let archived = row(&rows, Some("ayse"), Some(2024), None);

    assert_eq!(q2.backlog_count + archived.backlog_count, 1);
    assert_eq!(q2.todo_count + archived.todo_count, 1);
    assert_eq!(q2.done_count + archived.done_count, 1);
    assert_eq!(archived.done_count, 1);

    let year_total = KpiQuery {
        assignee: Some("ayse".into()),
        year: Some(2024),
        ..KpiQuery::default()
    };
    let selected = b.store.kpi_rows(&year_total).unwrap();
    let total: u64 = selected.iter().map(|row| row.total_count).sum();
    let done: u64 = selected.iter().map(|row| row.done_count).sum();
    assert_eq!(total, 3);
    assert!((tally_core::kpi::done_percentage(done, total) - 33.33).abs() < f64::EPSILON);
}

#[test]
fn archive_override_beats_stored_period() {
    let config = ProjectConfig::default();
    let b = board(&config);
    let item = create(&b, "Old", &b.archive_2023, &[], at(2024, 2, 1));
    assert_eq!(item.report_year, Some(2024));

    let rows = b.store.kpi_rows(&KpiQuery::default()).unwrap();
    let archived = row(&rows, None, Some(2023), None);
    assert_eq!(archived.done_count, 1);
    assert!((archived.done_pct - 100.0).abs() < f64::EPSILON);

    let action = b.store.drill(&archived.key, Some(Metric::Done));
    let hits = b.store.find_items(&action.filter).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].item.id, item.id);
}

#[test]
fn archive_override_can_be_disabled() {
    let mut config = ProjectConfig::default();
    config.report.archive_override = false;
    let b = board(&config);
    create(&b, "Open archive", &b.archive_2024, &[], at(2024, 8, 1));

    let rows = b.store.kpi_rows(&KpiQuery::default()).unwrap();
    let q3 = row(&rows, None, Some(2024), Some(Quarter::Q3));
    assert_eq!(q3.inprogress_count, 1);
    assert_eq!(q3.done_count, 0);
}

#[test]
fn fan_out_and_null_groups() {
    let config = ProjectConfig::default();
    let b = board(&config);
    let apollo = b.store.add_project("Apollo").unwrap();
    let pair = b
        .store
        .create_item_at(
            NewItem::titled("Pair")
                .in_stage(b.review.id)
                .in_project(apollo.id)
                .assigned_to("ayse")
                .assigned_to("mehmet"),
            &WriteMode::user("lead"),
            at(2024, 1, 15),
        )
        .unwrap();
    create(&b, "Nobody", &b.done, &[], at(2024, 1, 16));

    let rows = b.store.kpi_rows(&KpiQuery::default()).unwrap();
    assert_eq!(rows.len(), 3);
    for name in ["ayse", "mehmet"] {
        let r = row(&rows, Some(name), Some(2024), Some(Quarter::Q1));
        assert_eq!(r.key.project.as_deref(), Some("Apollo"));
        assert_eq!(r.inprogress_count, 1);
    }
    let nobody = row(&rows, None, Some(2024), Some(Quarter::Q1));
    assert_eq!(nobody.key.project, None);
    assert_eq!(nobody.done_count, 1);

    let action = b.store.drill(&nobody.key, None);
    assert!(matches!(&action.filter, Filter::All(parts) if parts.contains(&Filter::Unassigned)));
    let hits = b.store.find_items(&action.filter).unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits.iter().all(|view| view.item.id != pair.id));
}

#[test]
fn view_tracks_writes_without_refresh() {
    let config = ProjectConfig::default();
    let b = board(&config);
    let item = create(&b, "Live", &b.backlog, &["ayse"], at(2024, 3, 1));

    let before = b.store.kpi_rows(&KpiQuery::default()).unwrap();
    assert_eq!(before[0].backlog_count, 1);

    b.store
        .update_item_at(&item.id, ItemUpdate::stage(Some(b.done.id)), &WriteMode::user("ayse"), at(2024, 7, 2))
        .unwrap();

    let after = b.store.kpi_rows(&KpiQuery::default()).unwrap();
    let q3 = row(&after, Some("ayse"), Some(2024), Some(Quarter::Q3));
    assert_eq!(q3.done_count, 1);
    assert!(after.iter().all(|r| r.key.quarter != Some(Quarter::Q1)));
}

#[test]
fn drill_down_is_exact_for_every_row_and_metric() {
    for mode in [InProgressMode::CatchAll, InProgressMode::Explicit] {
        let mut config = ProjectConfig::default();
        config.report.in_progress = mode;
        let b = board(&config);
        let wip = b.store.add_stage(NewStage::named("In Progress").at(7)).unwrap();
        let apollo = b.store.add_project("Apollo").unwrap();

        let stages = [&b.backlog, &b.todo_review, &b.review, &b.done, &b.archive_2024, &b.archive_2023, &wip];
        for (idx, stage) in stages.iter().enumerate() {
            for month in [2_u32, 5, 11] {
                let mut new = NewItem::titled(format!("{} {month}", stage.name)).in_stage(stage.id);
                if idx % 2 == 0 {
                    new = new.in_project(apollo.id).assigned_to("ayse");
                }
                if month == 5 {
                    new = new.assigned_to("mehmet");
                }
                b.store
                    .create_item_at(new, &WriteMode::System, at(2024, month, 3))
                    .unwrap();
            }
        }

        let rows = b.store.kpi_rows(&KpiQuery::default()).unwrap();
        assert!(!rows.is_empty());
        for kpi in &rows {
            let checks = [
                (Metric::Backlog, kpi.count(Bucket::Backlog)),
                (Metric::Todo, kpi.count(Bucket::Todo)),
                (Metric::InProgress, kpi.count(Bucket::InProgress)),
                (Metric::Done, kpi.count(Bucket::Done)),
                (Metric::Total, kpi.total_count),
            ];
            for (metric, expected) in checks {
                let action = b.store.drill(&kpi.key, Some(metric));
                let hits = b.store.find_items(&action.filter).unwrap();
                assert_eq!(
                    u64::try_from(hits.len()).unwrap(),
                    expected,
                    "{mode:?} {metric} on {:?}: {}",
                    kpi.key,
                    action.filter
                );
            }
        }
    }
}

#[test]
fn query_restricts_rows() {
    let config = ProjectConfig::default();
    let b = board(&config);
    create(&b, "One", &b.review, &["ayse"], at(2023, 2, 1));
    create(&b, "Two", &b.review, &["mehmet"], at(2024, 2, 1));

    let only_2023 = KpiQuery {
        year: Some(2023),
        ..KpiQuery::default()
    };
    let rows = b.store.kpi_rows(&only_2023).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].key,
        KpiKey {
            assignee: Some("ayse".into()),
            project: None,
            year: Some(2023),
            quarter: Some(Quarter::Q1),
        }
    );
}
