use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::storage::{MemberRole, PresenceState};

/// 线上消息类型编码 / Wire message type codes
///
/// 入站信封携带 `type`，出站应答携带 `msgid`。
/// Inbound envelopes carry `type`, outbound acks carry `msgid`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MsgType {
    Login,
    LoginAck,
    Register,
    RegisterAck,
    OneChat,
    AddFriend,
    CreateGroup,
    AddGroup,
    GroupChat,
    Logout,
    CreateGroupAck,
    AddGroupAck,
}

impl MsgType {
    pub const fn code(self) -> i64 {
        match self {
            MsgType::Login => 1,
            MsgType::LoginAck => 2,
            MsgType::Register => 3,
            MsgType::RegisterAck => 4,
            MsgType::OneChat => 5,
            MsgType::AddFriend => 6,
            MsgType::CreateGroup => 7,
            MsgType::AddGroup => 8,
            MsgType::GroupChat => 9,
            MsgType::Logout => 10,
            MsgType::CreateGroupAck => 11,
            MsgType::AddGroupAck => 12,
        }
    }
}

/// 通用应答 / Generic acknowledgement
#[derive(Serialize, Deserialize, Debug)]
pub struct Ack {
    pub msgid: i64,
    pub errno: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errmsg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

impl Ack {
    pub fn ok(msg: MsgType) -> Self {
        Self { msgid: msg.code(), errno: 0, errmsg: None, id: None }
    }

    pub fn ok_with_id(msg: MsgType, id: i64) -> Self {
        Self { msgid: msg.code(), errno: 0, errmsg: None, id: Some(id) }
    }

    pub fn failure(msg: MsgType, err: &ServiceError) -> Self {
        Self { msgid: msg.code(), errno: err.errno(), errmsg: Some(err.to_string()), id: None }
    }
}

/// 好友摘要 / Friend summary
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FriendSummary {
    pub id: i64,
    pub name: String,
    pub state: PresenceState,
}

/// 群成员摘要 / Group member summary
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GroupMemberSummary {
    pub id: i64,
    pub name: String,
    pub state: PresenceState,
    pub role: MemberRole,
}

/// 群摘要 / Group summary
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GroupSummary {
    pub id: i64,
    pub groupname: String,
    pub groupdesc: String,
    pub users: Vec<GroupMemberSummary>,
}

/// 登录应答 / Login acknowledgement
///
/// 空的离线消息、好友、群列表不出现在应答里。
/// Empty offline/friend/group lists are omitted from the ack.
#[derive(Serialize, Deserialize, Debug)]
pub struct LoginAck {
    pub msgid: i64,
    pub errno: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errmsg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub offlinemsg: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub friends: Vec<FriendSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<GroupSummary>,
}

impl LoginAck {
    pub fn success(
        id: i64,
        name: String,
        offlinemsg: Vec<String>,
        friends: Vec<FriendSummary>,
        groups: Vec<GroupSummary>,
    ) -> Self {
        Self {
            msgid: MsgType::LoginAck.code(),
            errno: 0,
            errmsg: None,
            id: Some(id),
            name: Some(name),
            offlinemsg,
            friends,
            groups,
        }
    }

    pub fn failure(err: &ServiceError) -> Self {
        Self {
            msgid: MsgType::LoginAck.code(),
            errno: err.errno(),
            errmsg: Some(err.to_string()),
            id: None,
            name: None,
            offlinemsg: Vec::new(),
            friends: Vec::new(),
            groups: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_login_ack_has_no_roster_fields() {
        let ack = LoginAck::failure(&ServiceError::Auth);
        let js: serde_json::Value = serde_json::from_str(&serde_json::to_string(&ack).unwrap()).unwrap();
        assert_eq!(js["msgid"], MsgType::LoginAck.code());
        assert_eq!(js["errno"], 1);
        assert!(js.get("offlinemsg").is_none());
        assert!(js.get("friends").is_none());
        assert!(js.get("groups").is_none());
    }

    #[test]
    fn success_login_ack_carries_identity_and_queue() {
        let ack = LoginAck::success(7, "amy".into(), vec!["{\"type\":5}".into()], Vec::new(), Vec::new());
        let js: serde_json::Value = serde_json::from_str(&serde_json::to_string(&ack).unwrap()).unwrap();
        assert_eq!(js["errno"], 0);
        assert_eq!(js["id"], 7);
        assert_eq!(js["name"], "amy");
        assert_eq!(js["offlinemsg"][0], "{\"type\":5}");
        assert!(js.get("friends").is_none());
    }

    #[test]
    fn duplicate_login_maps_to_distinct_errno() {
        let ack = LoginAck::failure(&ServiceError::AlreadyLoggedIn);
        assert_eq!(ack.errno, 2);
    }
}
