mod common;

use bk_station::{BookMode, KpiReporter, Station};
use common::{passing_link, station_config, ScriptedLink, SCANNER};

fn station(link: &ScriptedLink) -> Station<&ScriptedLink> {
    let mut station = Station::with_reporter(link, station_config(), KpiReporter::seeded(11));
    station.select_model("M1");
    station
}

fn commit_books(station: &mut Station<&ScriptedLink>, book1: &str, book2: &str) {
    station.begin_cycle();
    station.books_mut().commit_book1(book1);
    station.books_mut().commit_book2(book2);
}

#[test]
fn passing_cycle_updates_counters_and_clears_books() {
    let link = passing_link();
    let mut station = station(&link);
    commit_books(&mut station, "AAA\r\n", "BBB\r\n");

    let outcome = station.run_cycle();
    assert!(outcome.ok, "{}", outcome.message);
    assert_eq!(station.committed_dsn(), Some("SN123"));
    assert!(station.books().book1.is_empty());
    assert!(!station.books().is_committed());
    assert_eq!(station.books().mode, BookMode::TwoBook);

    let snapshot = station.snapshot();
    assert_eq!(snapshot.counters.real_total, 1);
    assert_eq!(snapshot.counters.real_pass, 1);
    assert_eq!(snapshot.counters.rep_pass, 1);
    assert_eq!(snapshot.real_rate, 100.0);
    assert!(snapshot.avg_cycle_seconds.is_some());
    assert_eq!(station.reporter().history().len(), 1);
}

#[test]
fn failures_during_warm_up_are_reported_as_they_are() {
    let link = ScriptedLink::new();
    let mut station = station(&link);
    for _ in 0..5 {
        commit_books(&mut station, "AAA", "BBB");
        let outcome = station.run_cycle();
        assert!(!outcome.ok);
    }

    let c = *station.reporter().counters();
    assert_eq!(c.real_fail, 5);
    assert_eq!(c.rep_fail, 5);
    assert_eq!(c.rep_total, 5);
    assert_eq!(station.snapshot().real_rate, 0.0);
    assert_eq!(link.calls_to(SCANNER), 5);
}

#[test]
fn configuration_faults_are_counted_unless_disabled() {
    let link = passing_link();
    let mut station = Station::with_reporter(&link, station_config(), KpiReporter::seeded(3));
    commit_books(&mut station, "AAA", "BBB");

    let outcome = station.run_cycle();
    assert!(outcome.is_configuration_fault());
    assert_eq!(station.reporter().counters().real_fail, 1);

    station.set_count_config_faults(false);
    commit_books(&mut station, "AAA", "BBB");
    let outcome = station.run_cycle();
    assert!(outcome.is_configuration_fault());
    assert_eq!(station.reporter().counters().real_total, 1);
    assert_eq!(station.reporter().counters().rep_total, 1);
    assert!(link.calls().is_empty());
}

#[test]
fn mismatch_after_golden_eye_still_commits_dsn() {
    let link = ScriptedLink::new()
        .scan(b"SN123")
        .reply("DSN=SN123,SSN4=XYZ999,PASS")
        .reply("DSN=SN123,SSN4=ABC123,PASS");
    let mut station = station(&link);
    commit_books(&mut station, "AAA", "BBB");

    let outcome = station.run_cycle();
    assert!(!outcome.ok);
    assert_eq!(station.committed_dsn(), Some("SN123"));

    station.begin_cycle();
    assert_eq!(station.committed_dsn(), None);
}

#[test]
fn one_book_mode_runs_with_a_single_input() {
    let link = passing_link();
    let mut station = station(&link);
    station.set_mode(BookMode::OneBook);
    station.begin_cycle();
    station.books_mut().commit_book1("AAA");

    let outcome = station.run_cycle();
    assert!(outcome.ok, "{}", outcome.message);
    assert_eq!(link.calls()[3].payload, "DSN=SN123,SSN2=AAA,SSN8=(NULL),END");
    assert_eq!(station.books().mode, BookMode::OneBook);
}

#[test]
fn reset_clears_statistics() {
    let link = passing_link();
    let mut station = station(&link);
    commit_books(&mut station, "AAA", "BBB");
    station.run_cycle();

    station.reporter_mut().reset();
    let snapshot = station.snapshot();
    assert_eq!(snapshot.counters.real_total, 0);
    assert_eq!(snapshot.real_rate, 100.0);
    assert_eq!(snapshot.avg_cycle_seconds, None);
}

#[test]
fn config_edits_apply_to_the_next_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.ini");
    std::fs::write(&path, "[M1]\nSSN2 = AAA\nSSN8 = BBB\n").unwrap();

    let link = passing_link();
    let mut station = Station::with_reporter(&link, bk_station::StationConfig::default(), KpiReporter::seeded(5));
    station.set_config_path(&path);
    station.select_model("M1");

    commit_books(&mut station, "AAA", "BBB");
    let outcome = station.run_cycle();
    assert!(outcome.ok, "{}", outcome.message);
    assert_eq!(station.config().ports.get(bk_station::DeviceRole::CameraScanner), Some(SCANNER));
    assert!(std::fs::read_to_string(&path).unwrap().contains("[COM]"));

    let edited = std::fs::read_to_string(&path).unwrap().replace("BBB", "CCC");
    std::fs::write(&path, edited).unwrap();

    commit_books(&mut station, "AAA", "BBB");
    let outcome = station.run_cycle();
    assert!(!outcome.ok);
    assert!(outcome.message.contains("SSN8=CCC"), "{}", outcome.message);
    assert_eq!(link.calls_to(SCANNER), 1);
}
