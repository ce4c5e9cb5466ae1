#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    Scan,
    Inject,
    Verify,
    LedgerAssign,
    LedgerPropagate,
    RunQa,
    DetectEncoding,
    ProjectOpen,
    ProjectSave,
    Unknown,
}

impl From<&str> for Command {
    fn from(s: &str) -> Self {
        match s {
            "ping" => Command::Ping,
            "scan" => Command::Scan,
            "inject" => Command::Inject,
            "verify" => Command::Verify,
            "ledger.assign" => Command::LedgerAssign,
            "ledger.propagate" => Command::LedgerPropagate,
            "run_qa" => Command::RunQa,
            "encoding.detect" | "detect_encoding" => Command::DetectEncoding,
            "project.open" => Command::ProjectOpen,
            "project.save" => Command::ProjectSave,
            _ => Command::Unknown,
        }
    }
}
