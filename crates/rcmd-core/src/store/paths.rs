//! Store path layout.
//!
//! ```text
//! machines/<machineId>/lastSeen   agent-written heartbeat (RFC 3339, UTC)
//! machines/<machineId>/cmd        operator-written pending command, agent-cleared
//! machines/<machineId>/result     agent-written result text
//! chat/<roomId>/messages/<autoId> append-only chat records
//! ```

use rcmd_common::MachineId;

pub const MACHINES: &str = "machines";
pub const CHAT: &str = "chat";

pub const LAST_SEEN: &str = "lastSeen";
pub const CMD: &str = "cmd";
pub const RESULT: &str = "result";

pub fn machine(id: &MachineId) -> String {
    format!("{}/{}", MACHINES, id)
}

pub fn last_seen(id: &MachineId) -> String {
    format!("{}/{}/{}", MACHINES, id, LAST_SEEN)
}

pub fn cmd(id: &MachineId) -> String {
    format!("{}/{}/{}", MACHINES, id, CMD)
}

pub fn result(id: &MachineId) -> String {
    format!("{}/{}/{}", MACHINES, id, RESULT)
}

pub fn chat_messages(room: &str) -> String {
    format!("{}/{}/messages", CHAT, room)
}
