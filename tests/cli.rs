//! End-to-end CLI tests using `assert_cmd` and the offline hash provider.

use assert_cmd::Command;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Env {
    home: TempDir,
    db: PathBuf,
    owner: String,
}

impl Env {
    fn new() -> Self {
        let home = TempDir::new().unwrap();
        let db = home.path().join("work").join("kb.db");
        Self {
            home,
            db,
            owner: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// A command isolated from the caller's config and environment.
    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("docembed").unwrap();
        cmd.env("HOME", self.home.path())
            .env("DOCEMBED_PROVIDER", "hash")
            .env_remove("DOCEMBED_DB")
            .env_remove("DOCEMBED_OWNER")
            .env_remove("DOCEMBED_MODEL")
            .env_remove("DOCEMBED_ENDPOINT")
            .env_remove("DOCEMBED_API_KEY")
            .env_remove("OPENAI_API_KEY")
            .env_remove("DOCEMBED_CHUNK_SIZE")
            .env_remove("DOCEMBED_CHUNK_OVERLAP")
            .env_remove("DOCEMBED_CONCURRENCY")
            .env_remove("DOCEMBED_FILES_DIR")
            .env_remove("RUST_LOG")
            .arg("--db")
            .arg(&self.db);
        cmd
    }

    fn owned(&self) -> Command {
        let mut cmd = self.cmd();
        cmd.arg("--owner").arg(&self.owner);
        cmd
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.home.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }
}

fn json_stdout(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).unwrap()
}

fn json_stderr(cmd: &mut Command, exit_code: i32) -> Value {
    let output = cmd.assert().code(exit_code).get_output().stderr.clone();
    serde_json::from_slice(&output).unwrap()
}

fn text(len: usize) -> String {
    "Orders placed before noon ship the same day. "
        .chars()
        .cycle()
        .take(len)
        .collect()
}

#[test]
fn test_version_json() {
    let env = Env::new();
    let out = json_stdout(env.cmd().arg("version"));
    assert_eq!(out["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(out["schema_version"], 1);
}

#[test]
fn test_ingest_text_then_search() {
    let env = Env::new();
    let body = "Refunds are issued within fourteen days for damaged parcels.";

    let report = json_stdout(
        env.owned()
            .args(["ingest", "text", body, "--name", "returns", "--description", "Returns policy"]),
    );
    assert_eq!(report["chunk_count"], 1);
    assert_eq!(report["job"]["status"], "completed");
    assert_eq!(report["job"]["job_type"], "text_input");
    let record_id = report["record_ids"][0].as_str().unwrap().to_string();

    let results = json_stdout(env.owned().args(["search", body, "--agent", "support-bot"]));
    assert_eq!(results["count"], 1);
    assert_eq!(results["results"][0]["id"], record_id.as_str());
    assert_eq!(results["results"][0]["content"], body);

    let record = json_stdout(env.owned().args(["show", &record_id]));
    assert_eq!(record["name"], "returns");
    assert_eq!(record["metadata"]["fileName"], "text-input.txt");
}

#[test]
fn test_records_are_scoped_to_owner() {
    let env = Env::new();
    json_stdout(env.owned().args(["ingest", "text", "private notes", "--name", "notes"]));

    let other = uuid::Uuid::new_v4().to_string();
    let listed = json_stdout(env.cmd().args(["--owner", &other, "list"]));
    assert_eq!(listed["count"], 0);

    let mine = json_stdout(env.owned().arg("list"));
    assert_eq!(mine["count"], 1);
    assert_eq!(mine["total"], 1);
}

#[test]
fn test_ingest_reads_stdin() {
    let env = Env::new();
    let report = json_stdout(
        env.owned()
            .args(["ingest", "text", "--name", "piped", "--chunk-size", "100", "--chunk-overlap", "0"])
            .write_stdin(text(250)),
    );
    assert_eq!(report["chunk_count"], 3);
}

#[test]
fn test_ingest_files_and_delete_cascade() {
    let env = Env::new();
    let path = env.write("guide.md", &text(150));

    let report = json_stdout(
        env.owned()
            .arg("ingest")
            .arg("file")
            .arg(&path)
            .args(["--name", "guides", "--chunk-size", "100", "--chunk-overlap", "20"]),
    );
    assert_eq!(report["job"]["job_type"], "file_upload");
    assert_eq!(report["job"]["result"]["fileCount"], 1);
    // 150 chars: [0,100) then [80,150)
    assert_eq!(report["chunk_count"], 2);

    let stored_dir = env.db.parent().unwrap().join("files").join(&env.owner);
    assert_eq!(fs::read_dir(&stored_dir).unwrap().count(), 1);

    let ids: Vec<String> = report["record_ids"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();

    let first = json_stdout(env.owned().args(["delete", &ids[0]]));
    assert!(first.get("removed_file").is_none());

    let last = json_stdout(env.owned().args(["delete", &ids[1]]));
    assert_eq!(last["removed_file"], "guide.md");
    assert_eq!(fs::read_dir(&stored_dir).unwrap().count(), 0);
}

#[test]
fn test_missing_owner_is_a_validation_error() {
    let env = Env::new();
    let err = json_stderr(env.cmd().args(["ingest", "text", "hello", "--name", "x"]), 4);
    assert_eq!(err["error"]["code"], "INVALID_PARAMETER");
}

#[test]
fn test_invalid_chunking_creates_no_job() {
    let env = Env::new();
    let err = json_stderr(
        env.owned().args([
            "ingest", "text", "hello", "--name", "x", "--chunk-size", "100", "--chunk-overlap", "100",
        ]),
        4,
    );
    assert_eq!(err["error"]["code"], "INVALID_PARAMETER");

    let jobs = json_stdout(env.owned().args(["job", "list"]));
    assert_eq!(jobs["count"], 0);
}

#[test]
fn test_job_show_and_unknown_job() {
    let env = Env::new();
    let report = json_stdout(env.owned().args(["ingest", "text", "tracked", "--name", "t"]));
    let job_id = report["job"]["id"].as_str().unwrap().to_string();

    let job = json_stdout(env.owned().args(["job", "show", &job_id]));
    assert_eq!(job["status"], "completed");
    assert_eq!(job["parameters"]["modelId"], "hash-embed");

    let missing = uuid::Uuid::new_v4().to_string();
    let err = json_stderr(env.owned().args(["job", "show", &missing]), 3);
    assert_eq!(err["error"]["code"], "JOB_NOT_FOUND");
}

#[test]
fn test_search_rejects_bad_threshold() {
    let env = Env::new();
    let err = json_stderr(env.owned().args(["search", "q", "--threshold", "1.5"]), 4);
    assert_eq!(err["error"]["code"], "INVALID_PARAMETER");
}

#[test]
fn test_chunk_preview() {
    let env = Env::new();
    let path = env.write("long.txt", &text(2600));

    let out = json_stdout(
        env.cmd()
            .arg("chunk")
            .arg(&path)
            .args(["--chunk-size", "1000", "--chunk-overlap", "200"]),
    );
    assert_eq!(out["count"], 3);
    assert_eq!(out["chunks"][1]["start_index"], 800);
    assert_eq!(out["chunks"][2]["end_index"], 2600);
    assert!(!Path::new(&env.db).exists());
}

#[test]
fn test_config_set_and_show() {
    let env = Env::new();
    let saved = json_stdout(env.cmd().args(["config", "set", "--chunk-size", "500", "--chunk-overlap", "50"]));
    assert_eq!(saved["success"], true);

    let shown = json_stdout(env.cmd().args(["config", "show"]));
    assert_eq!(shown["effective"]["provider"], "hash");
    assert_eq!(shown["effective"]["chunk_size"], 500);
    assert_eq!(shown["saved"]["chunk_overlap"], 50);

    json_stdout(env.cmd().args(["config", "reset"]));
    let reset = json_stdout(env.cmd().args(["config", "show"]));
    assert_eq!(reset["effective"]["chunk_size"], 1000);
}

#[test]
fn test_fresh_database_error_is_clean_json() {
    let env = Env::new();
    let output = env
        .owned()
        .args(["search", "q", "--limit", "0"])
        .assert()
        .code(4)
        .get_output()
        .stderr
        .clone();

    // Opening a new database must not log anything ahead of the error
    let stderr = String::from_utf8(output).unwrap();
    assert!(stderr.trim_start().starts_with('{'), "{stderr}");
    assert!(env.db.exists());
}

#[test]
fn test_agent_settings_drive_search_defaults() {
    let env = Env::new();
    for body in ["parcel tracking one", "parcel tracking two", "parcel tracking three"] {
        json_stdout(env.owned().args(["ingest", "text", body, "--name", "kb"]));
    }

    let unsaved = json_stdout(env.owned().args(["agent-settings", "get", "bot"]));
    assert_eq!(unsaved["saved"], false);

    let saved = json_stdout(
        env.owned()
            .args(["agent-settings", "set", "bot", "--limit", "2", "--threshold", "-1"]),
    );
    assert_eq!(saved["limit"], 2);
    assert_eq!(saved["enabled"], true);

    let results = json_stdout(env.owned().args(["search", "parcel tracking", "--agent", "bot"]));
    assert_eq!(results["count"], 2);

    json_stdout(env.owned().args(["agent-settings", "set", "bot", "--enabled", "false"]));
    let err = json_stderr(env.owned().args(["search", "parcel tracking", "--agent", "bot"]), 4);
    assert_eq!(err["error"]["code"], "INVALID_PARAMETER");

    let err = json_stderr(env.owned().args(["agent-settings", "set", "bot", "--limit", "0"]), 4);
    assert_eq!(err["error"]["code"], "INVALID_PARAMETER");
}

#[test]
fn test_usage_and_history_of_a_record() {
    let env = Env::new();
    let body = "Invoices are sent monthly to the billing contact.";
    let report = json_stdout(env.owned().args(["ingest", "text", body, "--name", "billing"]));
    let id = report["record_ids"][0].as_str().unwrap().to_string();
    let job_id = report["job"]["id"].as_str().unwrap().to_string();

    json_stdout(env.owned().args(["search", body, "--agent", "support-bot"]));

    let usage = json_stdout(env.owned().args(["usage", &id]));
    assert_eq!(usage["count"], 1);
    assert_eq!(usage["usage"][0]["agent_id"], "support-bot");
    assert_eq!(usage["usage"][0]["query"], body);

    json_stdout(env.owned().args(["update", &id, "--name", "invoices"]));
    let history = json_stdout(env.owned().args(["history", &id]));
    assert_eq!(history["count"], 2);
    assert_eq!(history["events"][0]["event_type"], "embedding_updated");
    assert_eq!(history["events"][1]["event_type"], "embedding_created");

    let job_history = json_stdout(env.owned().args(["job", "history", &job_id]));
    assert_eq!(job_history["events"][0]["event_type"], "job_completed");

    let stranger = uuid::Uuid::new_v4().to_string();
    let err = json_stderr(env.cmd().args(["--owner", &stranger, "usage", &id]), 3);
    assert_eq!(err["error"]["code"], "EMBEDDING_NOT_FOUND");
}
