use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::Error;
use crate::model::block::BlockId;
use crate::model::entry::EntryStatus;
use crate::model::project::ContainerProfile;
use crate::services::pipeline::CancelToken;
use crate::services::{project, workflow};

mod command;
use command::Command;

fn get_cmd(req: &Value) -> &str {
    req.get("cmd").and_then(|v| v.as_str()).unwrap_or("")
}

fn get_id(req: &Value) -> Value {
    req.get("id").cloned().unwrap_or(Value::Null)
}

fn get_payload(req: &Value) -> &Value {
    static EMPTY: Value = Value::Null;
    req.get("payload").unwrap_or(&EMPTY)
}

fn ok(id: Value, payload: Value) -> String {
    json!({
        "id": id,
        "status": "ok",
        "payload": payload
    })
    .to_string()
}

fn err(id: Value, message: impl Into<String>) -> String {
    json!({
        "id": id,
        "status": "error",
        "message": message.into()
    })
    .to_string()
}

fn str_field<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

fn path_field(payload: &Value, key: &str) -> Result<PathBuf, String> {
    str_field(payload, key)
        .map(PathBuf::from)
        .ok_or_else(|| format!("payload.{key} is required"))
}

/// Inline `project` object, else `project_path` on disk, else defaults.
fn profile_from(payload: &Value) -> Result<ContainerProfile, String> {
    if let Some(p) = payload.get("project").filter(|v| !v.is_null()) {
        let profile: ContainerProfile =
            serde_json::from_value(p.clone()).map_err(|e| format!("invalid payload.project: {e}"))?;
        profile.validate()?;
        return Ok(profile);
    }
    match str_field(payload, "project_path") {
        Some(path) => project::open_project(Path::new(path)).map_err(|e| e.to_string()),
        None => Ok(ContainerProfile::default()),
    }
}

fn ledger_field(payload: &Value, profile: &ContainerProfile) -> PathBuf {
    str_field(payload, "ledger")
        .map(PathBuf::from)
        .unwrap_or_else(|| project::ledger_path(profile))
}

fn reply<T: Serialize>(id: Value, result: Result<T, Error>) -> String {
    match result.map(|v| serde_json::to_value(v)) {
        Ok(Ok(v)) => ok(id, v),
        Ok(Err(e)) => err(id, format!("failed to serialize reply: {e}")),
        Err(e) => err(id, e.to_string()),
    }
}

pub fn handle(input: &str) -> String {
    let req: Value = match serde_json::from_str(input) {
        Ok(v) => v,
        Err(_) => {
            return json!({
                "status": "error",
                "message": "invalid json"
            })
            .to_string();
        }
    };

    let id = get_id(&req);
    let payload = get_payload(&req);

    match dispatch(Command::from(get_cmd(&req)), payload, id.clone()) {
        Ok(out) => out,
        Err(message) => err(id, message),
    }
}

fn dispatch(cmd: Command, payload: &Value, id: Value) -> Result<String, String> {
    let out = match cmd {
        Command::Ping => ok(id, json!({ "message": "rtz-core alive" })),

        Command::Scan => {
            let profile = profile_from(payload)?;
            let container = path_field(payload, "container")?;
            let ledger = ledger_field(payload, &profile);
            reply(id, workflow::scan_file(&container, &ledger, &profile))
        }

        Command::Inject => {
            let profile = profile_from(payload)?;
            let container = path_field(payload, "container")?;
            let output = path_field(payload, "output")?;
            let ledger = ledger_field(payload, &profile);
            let flag_review = payload
                .get("flag_review")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            let result = workflow::inject_file(
                &container,
                &ledger,
                &output,
                &profile,
                flag_review,
                &CancelToken::new(),
            )
            .map(|summary| {
                json!({
                    "exit_code": summary.exit_code(),
                    "summary": summary,
                })
            });
            reply(id, result)
        }

        Command::Verify => {
            let profile = profile_from(payload)?;
            let patched = path_field(payload, "patched")?;
            let ledger = ledger_field(payload, &profile);
            let result = workflow::verify_file(&patched, &ledger, &profile)
                .map(|d| json!({ "discrepancies": d }));
            reply(id, result)
        }

        Command::LedgerAssign => {
            let profile = profile_from(payload)?;
            let ledger = ledger_field(payload, &profile);
            let entry_id: BlockId = str_field(payload, "id")
                .ok_or("payload.id is required")?
                .parse()?;
            let status = str_field(payload, "status").unwrap_or("in_progress");
            let status = EntryStatus::parse(status).ok_or_else(|| format!("unknown status {status:?}"))?;
            let target = payload.get("target_text").and_then(|v| v.as_str()).unwrap_or("");
            let notes = payload.get("notes").and_then(|v| v.as_str());
            let result = workflow::assign_entry(&ledger, &profile, entry_id, target, status, notes)
                .map(|e| json!({ "entry": e }));
            reply(id, result)
        }

        Command::LedgerPropagate => {
            let profile = profile_from(payload)?;
            let ledger = ledger_field(payload, &profile);
            let result = workflow::propagate_file(&ledger, &profile).map(|n| json!({ "applied": n }));
            reply(id, result)
        }

        Command::RunQa => {
            let profile = profile_from(payload)?;
            let ledger = ledger_field(payload, &profile);
            let result = workflow::qa_file(&ledger, &profile).map(|issues| json!({ "issues": issues }));
            reply(id, result)
        }

        Command::DetectEncoding => {
            let path = path_field(payload, "path")?;
            let offset = payload.get("offset").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
            let len = payload.get("len").and_then(|v| v.as_u64()).map(|l| l as usize);
            reply(id, workflow::detect_file(&path, offset, len))
        }

        Command::ProjectOpen => {
            let path = path_field(payload, "project_path")?;
            let result = project::open_project(&path).map(|p| json!({ "project": p }));
            reply(id, result)
        }

        Command::ProjectSave => {
            let project_val = payload.get("project").cloned().unwrap_or(Value::Null);
            if project_val.is_null() {
                return Err("payload.project is required".into());
            }
            let p: ContainerProfile = serde_json::from_value(project_val)
                .map_err(|e| format!("invalid payload.project: {e}"))?;
            let result = project::save_project(p).map(|saved| json!({ "project": saved }));
            reply(id, result)
        }

        Command::Unknown => err(id, "unknown command"),
    };

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(line: &str) -> Value {
        serde_json::from_str(&handle(line)).unwrap()
    }

    #[test]
    fn ping_and_unknown() {
        let r = call(r#"{"id": 1, "cmd": "ping"}"#);
        assert_eq!(r["status"], "ok");
        assert_eq!(r["id"], 1);

        let r = call(r#"{"id": 2, "cmd": "translate_entries"}"#);
        assert_eq!(r["status"], "error");
        assert_eq!(r["message"], "unknown command");

        assert_eq!(call("not json")["message"], "invalid json");
    }

    #[test]
    fn missing_fields_are_reported() {
        let r = call(r#"{"id": "a", "cmd": "scan", "payload": {}}"#);
        assert_eq!(r["status"], "error");
        assert_eq!(r["message"], "payload.container is required");

        let r = call(r#"{"id": "b", "cmd": "ledger.assign", "payload": {"id": "12"}}"#);
        assert_eq!(r["status"], "error");
    }

    #[test]
    fn scan_assign_and_qa_over_the_protocol() {
        let dir = tempfile::tempdir().unwrap();
        let container = dir.path().join("menu.rtz");
        let ledger = dir.path().join("ledger.json");
        std::fs::write(&container, b"Start\0\0\0Quit\0\0\0").unwrap();

        let project = json!({
            "source_charset": "windows-1252",
            "target_charset": "windows-1252",
        });
        let scan = json!({
            "id": 1,
            "cmd": "scan",
            "payload": { "project": project, "container": container, "ledger": ledger },
        });
        let r = call(&scan.to_string());
        assert_eq!(r["payload"]["registered"], 2);

        let assign = json!({
            "id": 2,
            "cmd": "ledger.assign",
            "payload": {
                "project": project,
                "ledger": ledger,
                "id": "0x00000008",
                "target_text": "Quit",
                "status": "COMPLETED",
            },
        });
        let r = call(&assign.to_string());
        assert_eq!(r["payload"]["entry"]["status"], "completed");

        let qa = json!({ "id": 3, "cmd": "run_qa", "payload": { "project": project, "ledger": ledger } });
        let r = call(&qa.to_string());
        assert_eq!(r["payload"]["issues"][0]["code"], "SAME_AS_SOURCE");
    }
}
