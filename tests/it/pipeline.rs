use crate::common::*;
use grievance_classifier::{
    pipeline::{DUPLICATE_ID_REASON, MISMATCH_REASON},
    Pipeline, Stage,
};
use std::{sync::atomic::Ordering, time::Duration};

const CATEGORY: usize = 2;
const REASONING: usize = 3;

fn mojibake_comment() -> String {
    // 12 three-char signatures in 200 chars: 18% density.
    format!("{}{}", "à¤¾".repeat(12), "x".repeat(164))
}

fn pipeline(ws: &Workspace, backend: ScriptedBackend, extra: &str) -> Pipeline<ScriptedBackend> {
    Pipeline::with_prompt(ws.config(extra), backend, "classify", vec![]).unwrap()
}

#[tokio::test]
async fn every_row_gets_exactly_one_outcome() {
    let ws = Workspace::new();
    let mut rows: Vec<String> = (1..=10)
        .map(|i| format!("T{i},\"Complaint number {i} about the delayed payment\""))
        .collect();
    rows[1] = "T2,".to_string();
    rows[4] = format!("T5,{}", mojibake_comment());
    rows[6] = "T7,short".to_string();
    ws.write_input("TicketNumber,Comments", &rows);

    let backend = ScriptedBackend::new().drop_result("T8").hallucinate("ZZZ");
    let summary = pipeline(&ws, backend, "").run().await.unwrap();

    assert_eq!(summary.written, 10);
    assert_eq!(
        summary.skipped + summary.classified + summary.failed,
        summary.written
    );
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.classified, 7);

    let out = ws.output_rows();
    assert_eq!(out.len(), 10);
    assert_eq!(&out[1][REASONING], "skipped_empty");
    assert_eq!(&out[1][CATEGORY], "");
    assert_eq!(&out[4][REASONING], "skipped_corrupted-encoding");
    assert_eq!(&out[6][CATEGORY], "category_t7");
    assert_eq!(&out[7][CATEGORY], "error");
    assert_eq!(&out[7][REASONING], MISMATCH_REASON);
    assert!(out.iter().all(|r| &r[0] != "ZZZ"));
}

#[tokio::test]
async fn output_order_follows_input_despite_latency() {
    let ws = Workspace::new();
    let ids = ws.write_tickets(12);
    // Groups of 3, cohorts of 2: the first group of each cohort answers last.
    let backend = ScriptedBackend::new()
        .delay("T1", Duration::from_millis(150))
        .delay("T7", Duration::from_millis(150));

    pipeline(&ws, backend, "").run().await.unwrap();

    let written: Vec<String> = ws.output_rows().iter().map(|r| r[0].to_string()).collect();
    assert_eq!(written, ids);
}

#[tokio::test]
async fn second_run_writes_nothing() {
    let ws = Workspace::new();
    ws.write_tickets(7);

    let first = pipeline(&ws, ScriptedBackend::new(), "").run().await.unwrap();
    assert_eq!(first.written, 7);
    let before = std::fs::read(ws.output()).unwrap();

    let rerun = pipeline(&ws, ScriptedBackend::new(), "");
    let second = rerun.run().await.unwrap();
    assert_eq!(second.resumed_from, 7);
    assert_eq!(second.written, 0);
    assert!(rerun.backend().calls().is_empty());
    assert_eq!(std::fs::read(ws.output()).unwrap(), before);
}

#[tokio::test]
async fn timed_out_group_fails_together_and_run_continues() {
    let ws = Workspace::new();
    ws.write_tickets(10);
    let backend = ScriptedBackend::new().fail("T3");

    let summary = pipeline(&ws, backend, "batch_size: 5")
        .run()
        .await
        .unwrap();
    assert_eq!(summary.failed, 5);
    assert_eq!(summary.classified, 5);

    let out = ws.output_rows();
    let reason = out[0][REASONING].to_string();
    assert!(reason.contains("timed out"), "{reason}");
    for row in &out[..5] {
        assert_eq!(&row[CATEGORY], "error");
        assert_eq!(&row[REASONING], reason);
    }
    for row in &out[5..] {
        assert_eq!(&row[CATEGORY], format!("category_{}", row[0].to_lowercase()));
    }
}

#[tokio::test]
async fn resumes_after_rows_already_written() {
    let ws = Workspace::new();
    let ids = ws.write_tickets(9);

    // A previous run that stopped after 4 rows.
    std::fs::create_dir_all(ws.output().parent().unwrap()).unwrap();
    let mut previous = String::from(
        "\u{FEFF}TicketNumber,Comments,grievance_category,reasoning,language,translation\n",
    );
    for id in &ids[..4] {
        previous.push_str(&format!("{id},earlier,category_x,earlier run,en,\n"));
    }
    std::fs::write(ws.output(), previous).unwrap();

    let pipeline = pipeline(&ws, ScriptedBackend::new(), "");
    let summary = pipeline.run().await.unwrap();
    assert_eq!(summary.resumed_from, 4);
    assert_eq!(summary.written, 5);
    assert_eq!(pipeline.backend().submitted(), &ids[4..]);

    let out = ws.output_rows();
    let written: Vec<String> = out.iter().map(|r| r[0].to_string()).collect();
    assert_eq!(written, ids);
    assert_eq!(&out[3][REASONING], "earlier run");
    assert_eq!(&out[4][REASONING], "batch T5");
}

#[tokio::test]
async fn resubmits_nothing_already_written() {
    let ws = Workspace::new();
    ws.write_tickets(6);
    pipeline(&ws, ScriptedBackend::new(), "").run().await.unwrap();

    ws.write_tickets(8);
    let rerun = pipeline(&ws, ScriptedBackend::new(), "");
    let summary = rerun.run().await.unwrap();
    assert_eq!(summary.written, 2);
    assert_eq!(rerun.backend().submitted(), vec!["T7", "T8"]);
    assert_eq!(ws.output_rows().len(), 8);
}

#[tokio::test]
async fn concurrency_stays_within_the_gate() {
    let ws = Workspace::new();
    ws.write_tickets(30);
    let mut backend = ScriptedBackend::new();
    for i in 1..=30 {
        backend = backend.delay(&format!("T{i}"), Duration::from_millis(20));
    }

    let pipeline = Pipeline::with_prompt(
        ws.config("batch_size: 2"),
        backend,
        "classify",
        vec![],
    )
    .unwrap();
    pipeline.run().await.unwrap();

    // max_concurrency is 2 in the test config.
    let backend = pipeline.backend();
    assert_eq!(backend.calls().len(), 15);
    let max = backend.max_in_flight.load(Ordering::SeqCst);
    assert!((1..=2).contains(&max), "{max}");
}

#[tokio::test]
async fn repeated_ids_are_not_submitted_twice() {
    let ws = Workspace::new();
    ws.write_input(
        "TicketNumber,Comments",
        &[
            "T1,\"first complaint about payment\"".to_string(),
            "T1,\"second complaint about payment\"".to_string(),
            ",\"complaint without an id at all\"".to_string(),
        ],
    );

    let summary = pipeline(&ws, ScriptedBackend::new(), "").run().await.unwrap();
    assert_eq!(summary.classified, 1);
    assert_eq!(summary.failed, 2);

    let out = ws.output_rows();
    assert_eq!(&out[0][CATEGORY], "category_t1");
    assert_eq!(&out[1][REASONING], DUPLICATE_ID_REASON);
    assert_eq!(&out[2][CATEGORY], "error");
}

#[tokio::test]
async fn single_mode_needs_no_id_column() {
    let ws = Workspace::new();
    ws.write_input(
        "Zone,Comments",
        &[
            "North,Road broken".to_string(),
            "South,".to_string(),
            "East,Water cut".to_string(),
        ],
    );
    let backend = ScriptedBackend::new()
        .fail("Water cut")
        .delay("Road broken", Duration::from_millis(50));

    let summary = pipeline(&ws, backend, "mode: single").run().await.unwrap();
    assert_eq!(
        (summary.classified, summary.skipped, summary.failed),
        (1, 1, 1)
    );

    let out = ws.output_rows();
    assert_eq!(&out[0][0], "North");
    assert_eq!(&out[0][CATEGORY], "category_road broken");
    assert_eq!(&out[0][4], "en");
    assert_eq!(&out[1][REASONING], "skipped_empty");
    assert_eq!(&out[2][CATEGORY], "error");
}

#[tokio::test]
async fn missing_comment_column_stops_before_any_call() {
    let ws = Workspace::new();
    ws.write_input("TicketNumber,Remarks", &["T1,hello there".to_string()]);

    let err = pipeline(&ws, ScriptedBackend::new(), "")
        .run()
        .await
        .unwrap_err();
    assert_eq!(err.stage(), Stage::Read);
    assert!(err.to_string().contains("`Comments`"), "{err}");
    assert!(!ws.output().exists());
}

#[tokio::test]
async fn missing_id_column_only_matters_in_batch_mode() {
    let ws = Workspace::new();
    ws.write_input("Comments", &["a comment long enough".to_string()]);

    let err = pipeline(&ws, ScriptedBackend::new(), "").run().await.unwrap_err();
    assert_eq!(err.stage(), Stage::Read);
    assert!(err.to_string().contains("`TicketNumber`"), "{err}");

    let summary = pipeline(&ws, ScriptedBackend::new(), "mode: single")
        .run()
        .await
        .unwrap();
    assert_eq!(summary.classified, 1);
}

#[tokio::test]
async fn header_only_input_writes_nothing() {
    let ws = Workspace::new();
    ws.write_input("TicketNumber,Comments", &[]);

    let summary = pipeline(&ws, ScriptedBackend::new(), "").run().await.unwrap();
    assert_eq!(summary.written, 0);
    assert_eq!(summary.total_rows, Some(0));
    assert!(!ws.output().exists());
}

#[tokio::test]
async fn output_starts_with_bom_once() {
    let ws = Workspace::new();
    ws.write_tickets(5);
    pipeline(&ws, ScriptedBackend::new(), "batch_size: 1")
        .run()
        .await
        .unwrap();

    let bytes = std::fs::read(ws.output()).unwrap();
    assert!(bytes.starts_with(b"\xEF\xBB\xBF"));
    assert_eq!(
        bytes.windows(3).filter(|w| *w == b"\xEF\xBB\xBF").count(),
        1
    );
    let text = String::from_utf8(bytes).unwrap();
    assert_eq!(text.matches("grievance_category").count(), 1);
}

#[tokio::test]
async fn bom_only_output_gets_a_header_and_resumes_cleanly() {
    let ws = Workspace::new();
    let ids = ws.write_tickets(4);
    std::fs::create_dir_all(ws.output().parent().unwrap()).unwrap();
    std::fs::write(ws.output(), b"\xEF\xBB\xBF").unwrap();

    let first = pipeline(&ws, ScriptedBackend::new(), "").run().await.unwrap();
    assert_eq!(first.resumed_from, 0);
    assert_eq!(first.written, 4);

    let bytes = std::fs::read(ws.output()).unwrap();
    assert!(bytes.starts_with(
        b"\xEF\xBB\xBFTicketNumber,Comments,grievance_category,reasoning,language,translation\n"
    ));
    assert_eq!(bytes.windows(3).filter(|w| *w == b"\xEF\xBB\xBF").count(), 1);

    let rerun = pipeline(&ws, ScriptedBackend::new(), "");
    let second = rerun.run().await.unwrap();
    assert_eq!(second.resumed_from, 4);
    assert_eq!(second.written, 0);
    assert!(rerun.backend().submitted().is_empty());

    let written: Vec<String> = ws.output_rows().iter().map(|r| r[0].to_string()).collect();
    assert_eq!(written, ids);
}

#[tokio::test]
async fn windows_1252_input_is_classified_as_text() {
    let ws = Workspace::new();
    std::fs::write(
        ws.input(),
        b"TicketNumber,Comments\nT1,\"Caf\xE9 licence renewal pending for six months\"\n".as_slice(),
    )
    .unwrap();
    let mut config = ws.config("mode: single");
    config.input_encoding = "cp1252".to_string();
    let backend = ScriptedBackend::new();
    let pipeline = Pipeline::with_prompt(config, backend, "classify", vec![]).unwrap();

    let summary = pipeline.run().await.unwrap();
    assert_eq!(summary.classified, 1);
    assert_eq!(
        pipeline.backend().submitted(),
        vec!["Caf\u{e9} licence renewal pending for six months"]
    );
    assert_eq!(
        &ws.output_rows()[0][1],
        "Caf\u{e9} licence renewal pending for six months"
    );
}
