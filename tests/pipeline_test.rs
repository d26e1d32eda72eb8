/// End-to-end sync runs against temp vaults
mod common;

use std::fs;

use common::*;
use obsidize::SyncError;
use obsidize::execute::ItemOutcome;
use obsidize::frontmatter;
use obsidize::plan::{Action, Reason};
use serde_json::json;

const A: &str = "0f8fad5b-d9cb-469f-a165-70867728950e";
const B: &str = "7c9e6679-7425-40de-944b-e07fc1f90ae7";
const P: &str = "5d2c1a44-8f3b-4c1e-9a7d-2b6e4f8c0a11";

fn conversation_a() -> ConversationBuilder {
    ConversationBuilder::new(A)
        .name("Rust lifetimes")
        .messages("a", 2, at(1, 9))
        .updated_at(at(1, 10))
}

fn conversation_b() -> ConversationBuilder {
    ConversationBuilder::new(B)
        .name("Trip planning")
        .messages("b", 3, at(1, 12))
        .updated_at(at(1, 14))
}

/// A with two more messages on day 3.
fn conversation_a_grown() -> ConversationBuilder {
    conversation_a()
        .message("a-2", "a message 2", at(3, 9))
        .message("a-3", "a message 3", at(3, 10))
        .updated_at(at(3, 10))
}

fn synced_workspace() -> Workspace {
    let ws = Workspace::new();
    ws.write_conversations(&[conversation_a(), conversation_b()]);
    ws.sync(at(2, 0));
    ws
}

#[test]
fn test_first_import_creates_every_conversation() {
    let ws = Workspace::new();
    ws.write_conversations(&[conversation_a(), conversation_b()]);

    let summary = ws.sync(at(2, 0));

    assert_eq!(summary.plan.action(A), Some(Action::Create));
    assert_eq!(summary.plan.action(B), Some(Action::Create));
    assert_eq!(summary.outcomes().created, 2);
    assert_eq!(ws.root_documents().len(), 2);

    let a = fs::read_to_string(ws.document_for(A)).unwrap();
    let b = fs::read_to_string(ws.document_for(B)).unwrap();
    assert_eq!(message_blocks(&a), 2);
    assert_eq!(message_blocks(&b), 3);

    let header = frontmatter::parse(&a).unwrap();
    assert_eq!(header.obsidized_at, Some(at(2, 0)));
    assert_eq!(header.created_at, Some(at(1, 9)));
    assert_eq!(header.source.as_deref(), Some("claude"));
    assert!(ws.document_for(A).ends_with("rust-lifetimes_0f8fad5b.md"));
}

#[test]
fn test_rerun_without_changes_writes_nothing() {
    let ws = synced_workspace();
    let before = ws.snapshot();

    let summary = ws.sync(at(5, 0));

    assert!(summary.plan.is_noop());
    assert_eq!(summary.written(), 0);
    assert!(summary.results.iter().all(|r| r.outcome == ItemOutcome::Unchanged));
    assert_eq!(ws.snapshot(), before);
}

#[test]
fn test_incremental_append_adds_exactly_the_new_messages() {
    let ws = synced_workspace();
    let path_a = ws.document_for(A);
    let old_a = fs::read_to_string(&path_a).unwrap();
    let old_b = fs::read_to_string(ws.document_for(B)).unwrap();

    ws.write_conversations(&[conversation_a_grown(), conversation_b()]);
    let summary = ws.sync(at(4, 0));

    assert_eq!(summary.plan.action(A), Some(Action::Update));
    assert_eq!(summary.plan.action(B), Some(Action::Unchanged));
    assert!(matches!(
        summary.results[0].outcome,
        ItemOutcome::Updated { added: 2, .. }
    ));

    let new_a = fs::read_to_string(&path_a).unwrap();
    assert_eq!(message_blocks(&new_a), 4);
    let old_body = frontmatter::split(&old_a).unwrap().body;
    let kept = old_body.strip_suffix("<!-- obsidize:end -->\n").unwrap();
    assert!(frontmatter::split(&new_a).unwrap().body.starts_with(kept));
    assert!(new_a.find("message a-2").unwrap() < new_a.find("message a-3").unwrap());

    let header = frontmatter::parse(&new_a).unwrap();
    assert_eq!(header.created_at, Some(at(1, 9)));
    assert_eq!(header.updated_at, Some(at(3, 10)));
    assert_eq!(header.obsidized_at, Some(at(4, 0)));

    assert_eq!(fs::read_to_string(ws.document_for(B)).unwrap(), old_b);
}

#[test]
fn test_messages_missing_from_an_earlier_snapshot_are_appended() {
    let ws = synced_workspace();
    let path_a = ws.document_for(A);

    // "late" was sent before the first run but only shows up in this export.
    ws.write_conversations(&[
        conversation_a()
            .message("late", "sent during the first export", at(1, 20))
            .message("new", "sent after it", at(3, 9))
            .updated_at(at(3, 9)),
        conversation_b(),
    ]);
    let summary = ws.sync(at(4, 0));

    assert!(matches!(
        summary.results[0].outcome,
        ItemOutcome::Updated { added: 2, .. }
    ));
    let text = fs::read_to_string(&path_a).unwrap();
    assert_eq!(message_blocks(&text), 4);
    let late = text.find("sent during the first export").unwrap();
    let new = text.find("sent after it").unwrap();
    assert!(text.find("a message 1").unwrap() < late);
    assert!(late < new);

    assert!(ws.sync(at(5, 0)).plan.is_noop());
}

#[test]
fn test_user_edits_survive_update() {
    let ws = synced_workspace();
    let path_a = ws.document_for(A);
    let text = fs::read_to_string(&path_a).unwrap();
    let edited = text.replacen(
        "# Rust lifetimes\n",
        "# Rust lifetimes\n\nMy note about lifetimes.\n",
        1,
    ) + "\n## My follow-up\n\nStill to read.\n";
    fs::write(&path_a, &edited).unwrap();

    ws.write_conversations(&[conversation_a_grown(), conversation_b()]);
    ws.sync(at(4, 0));

    let merged = fs::read_to_string(&path_a).unwrap();
    assert!(merged.contains("# Rust lifetimes\n\nMy note about lifetimes.\n"));
    assert!(merged.ends_with("a message 3\n\n<!-- obsidize:end -->\n\n## My follow-up\n\nStill to read.\n"));
    assert_eq!(message_blocks(&merged), 4);
}

#[test]
fn test_title_change_keeps_document_identity() {
    let ws = synced_workspace();
    let original = ws.document_for(A);

    let renamed = conversation_a_grown().name("Lifetimes, revisited");
    ws.write_conversations(&[renamed, conversation_b()]);
    ws.sync(at(4, 0));

    assert_eq!(ws.root_documents().len(), 2);
    assert_eq!(ws.document_for(A), original);
    // Rename again without new content: still found, still unchanged.
    let summary = ws.sync(at(5, 0));
    assert_eq!(summary.plan.action(A), Some(Action::Unchanged));
}

#[test]
fn test_records_without_uuid_are_counted_and_skipped() {
    let ws = Workspace::new();
    let conversations: Vec<ConversationBuilder> = (0..10)
        .map(|i| {
            let builder = if i % 3 == 2 {
                ConversationBuilder::without_uuid()
            } else {
                ConversationBuilder::new(&format!("00000000-0000-4000-8000-{i:012}"))
            };
            builder.messages(&format!("c{i}"), 2, at(1, 9))
        })
        .collect();
    ws.write_conversations(&conversations);

    let summary = ws.sync(at(2, 0));

    let counts = summary.validation.conversations;
    assert_eq!(counts.invalid, 3);
    assert_eq!(counts.valid, 7);
    let reasons: Vec<&str> = summary
        .validation
        .dropped()
        .map(|issue| issue.reason.as_str())
        .collect();
    assert_eq!(reasons, ["missing uuid"; 3]);
    assert_eq!(summary.outcomes().created, 7);
    assert_eq!(ws.root_documents().len(), 7);
}

#[test]
fn test_project_gains_documents_and_keeps_edits() {
    let ws = Workspace::new();
    let project = ProjectBuilder::new(P, "Deep Research")
        .doc("d1", "Notes.md", "First notes")
        .doc("d2", "schema.sql", "create table t (id int);");
    ws.write_projects(&[project.clone()]);

    let first = ws.sync(at(2, 0));
    assert_eq!(first.plan.action(P), Some(Action::Create));

    let folder = ws.vault().join("deep-research");
    let overview = fs::read_to_string(folder.join("00_overview.md")).unwrap();
    assert!(overview.contains("1. [[deep-research/01_notes|Notes.md]]"));
    assert!(overview.contains("2. [[deep-research/02_schema|schema.sql]]"));
    let sql = fs::read_to_string(folder.join("02_schema.md")).unwrap();
    assert!(sql.contains("```sql\ncreate table t (id int);\n```"));

    let notes_path = folder.join("01_notes.md");
    let annotated = fs::read_to_string(&notes_path).unwrap() + "\nmy annotations\n";
    fs::write(&notes_path, &annotated).unwrap();

    let grown = project
        .doc("d3", "plan.txt", "Step one")
        .description("Now with a plan")
        .updated_at(at(3, 0));
    ws.write_projects(&[grown]);
    let second = ws.sync(at(4, 0));

    assert_eq!(second.plan.action(P), Some(Action::Update));
    assert!(matches!(
        second.results[0].outcome,
        ItemOutcome::Updated { added: 1, .. }
    ));
    assert_eq!(fs::read_dir(&folder).unwrap().count(), 4);
    assert_eq!(fs::read_to_string(&notes_path).unwrap(), annotated);
    assert!(fs::read_to_string(folder.join("03_plan.md")).unwrap().contains("Step one"));

    let overview = fs::read_to_string(folder.join("00_overview.md")).unwrap();
    assert!(overview.contains("Now with a plan"));
    assert!(overview.contains("3. [[deep-research/03_plan|plan.txt]]"));
    let header = frontmatter::parse(&overview).unwrap();
    assert_eq!(header.obsidized_at, Some(at(4, 0)));
}

#[test]
fn test_dry_run_never_touches_the_vault() {
    let ws = Workspace::new();
    ws.write_conversations(&[conversation_a(), conversation_b()]);

    let config = obsidize::SyncConfig {
        dry_run: true,
        ..ws.config(at(2, 0))
    };
    let summary = ws.sync_with(config.clone());
    assert_eq!(summary.plan.counts().create, 2);
    assert!(summary.results.is_empty());
    assert!(!ws.vault().exists());

    ws.sync(at(2, 0));
    let before = ws.snapshot();
    ws.write_conversations(&[conversation_a_grown(), conversation_b()]);
    let summary = ws.sync_with(config);
    assert_eq!(summary.plan.action(A), Some(Action::Update));
    assert_eq!(ws.snapshot(), before);
}

#[test]
fn test_sequential_and_parallel_runs_agree() {
    let build = || {
        let ws = Workspace::new();
        // Same title everywhere so file names collide and need suffixes.
        let conversations: Vec<ConversationBuilder> = (0..16)
            .map(|i| {
                ConversationBuilder::new(&format!("0f8fad5b-0000-4000-8000-{i:012}"))
                    .name("Same title")
                    .messages(&format!("m{i}"), 3, at(1, 9))
            })
            .collect();
        ws.write_conversations(&conversations);
        ws.write_projects(&[ProjectBuilder::new(P, "Same title").doc("d1", "a.md", "x")]);
        ws
    };

    let sequential = build();
    sequential.sync_with(obsidize::SyncConfig {
        jobs: 1,
        ..sequential.config(at(2, 0))
    });
    let parallel = build();
    let summary = parallel.sync_with(obsidize::SyncConfig {
        jobs: 4,
        ..parallel.config(at(2, 0))
    });

    assert_eq!(summary.outcomes().created, 17);
    let seq = sequential.snapshot();
    assert_eq!(seq.len(), 18);
    assert_eq!(seq, parallel.snapshot());
}

#[test]
fn test_force_restores_deleted_message_blocks() {
    let ws = synced_workspace();
    let path_a = ws.document_for(A);
    let text = fs::read_to_string(&path_a).unwrap();
    let start = text.find("<!-- obsidize:message a-1 -->").unwrap();
    let end = text.find("<!-- obsidize:end -->").unwrap();
    let trimmed = format!("{}{}", &text[..start], &text[end..]);
    fs::write(&path_a, &trimmed).unwrap();

    assert!(ws.sync(at(3, 0)).plan.is_noop());

    let summary = ws.sync_with(obsidize::SyncConfig {
        force: true,
        ..ws.config(at(3, 0))
    });
    assert_eq!(summary.plan.get(A).unwrap().reason, Reason::Forced);
    assert!(matches!(
        summary.results[0].outcome,
        ItemOutcome::Updated { added: 1, .. }
    ));
    assert!(matches!(
        summary.results[1].outcome,
        ItemOutcome::Updated { added: 0, .. }
    ));
    let restored = fs::read_to_string(&path_a).unwrap();
    assert_eq!(message_blocks(&restored), 2);
}

#[test]
fn test_unreadable_sync_stamp_rebuilds_document_in_place() {
    let ws = synced_workspace();
    let path_a = ws.document_for(A);
    let text = fs::read_to_string(&path_a)
        .unwrap()
        .replace("a message 0", "a message 0, with my notes");
    let broken: String = text
        .lines()
        .map(|line| {
            if line.starts_with("obsidized_at:") {
                "obsidized_at: whenever\n".to_string()
            } else {
                format!("{line}\n")
            }
        })
        .collect();
    assert_ne!(broken, text);
    fs::write(&path_a, broken).unwrap();

    let summary = ws.sync(at(3, 0));

    assert_eq!(summary.plan.get(A).unwrap().reason, Reason::MissingSyncStamp);
    assert_eq!(ws.root_documents().len(), 2);
    let header = frontmatter::read(&path_a).unwrap();
    assert_eq!(header.obsidized_at, Some(at(3, 0)));
    let rebuilt = fs::read_to_string(&path_a).unwrap();
    assert!(rebuilt.contains("a message 0, with my notes"));
    assert_eq!(message_blocks(&rebuilt), 2);
}

#[test]
fn test_output_root_that_is_a_file_aborts() {
    let ws = Workspace::new();
    ws.write_conversations(&[conversation_a()]);
    fs::write(ws.vault(), "not a folder").unwrap();

    let err = obsidize::run_path(&ws.export_dir(), &ws.config(at(2, 0)), &obsidize::NullReporter)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SyncError>(),
        Some(SyncError::OutputRoot { .. })
    ));
    assert_eq!(fs::read_to_string(ws.vault()).unwrap(), "not a folder");
}

#[test]
fn test_export_without_collections_is_fatal() {
    let ws = Workspace::new();
    fs::write(ws.export_dir().join("users.json"), "[]").unwrap();

    let err = obsidize::run_path(&ws.export_dir(), &ws.config(at(2, 0)), &obsidize::NullReporter)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SyncError>(),
        Some(SyncError::NoItemCollections { .. })
    ));
    assert!(!ws.vault().exists());
}

#[test]
fn test_malformed_records_do_not_stop_the_run() {
    let ws = Workspace::new();
    ws.write_raw_conversations(&[
        conversation_a().to_json(),
        json!("not an object"),
        json!({"uuid": "no-dates", "name": "x", "chat_messages": []}),
        conversation_b().to_json(),
    ]);

    let summary = ws.sync(at(2, 0));

    assert_eq!(summary.validation.conversations.invalid, 2);
    assert_eq!(summary.outcomes().created, 2);
    assert!(!summary.has_failures());
}
