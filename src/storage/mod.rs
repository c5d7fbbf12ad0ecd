//! 存储模块 / Storage module
//!
//! sled 树承载用户、好友边、群组与离线队列；键统一使用大端编码的
//! 整数 id，前缀扫描即按 id 归组。
//! sled trees hold users, friend edges, groups and the offline queue; keys
//! are big-endian integer ids so prefix scans group by id.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};

mod traits;
pub use traits::{ChatStore, OfflineStore};

/// 在线状态，跨节点路由决策的唯一依据 / Presence state, the sole cross-node routing signal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceState {
    Online,
    Offline,
}

/// 群成员角色 / Group member role
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Creator,
    Normal,
}

/// 用户记录 / User record
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub name: String,
    pub password: String,
    pub state: PresenceState,
}

/// 群记录 / Group record
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: i64,
    pub name: String,
    pub desc: String,
}

/// 群及其成员清单 / A group together with its member roster
#[derive(Clone, Debug)]
pub struct GroupWithMembers {
    pub group: GroupRecord,
    pub members: Vec<(UserRecord, MemberRole)>,
}

#[derive(Clone)]
pub struct Storage {
    #[allow(dead_code)]
    db: Db,
    users: Tree,
    names: Tree,     // 用户名唯一索引 / unique display-name index
    friends: Tree,   // (user, friend) -> ()
    groups: Tree,
    gnames: Tree,    // 群名唯一索引 / unique group-name index
    members: Tree,   // (group, user) -> role
    member_of: Tree, // (user, group) -> ()
    offline: Tree,   // (user, seq) -> payload
    meta: Tree,      // 计数器 / counters
}

const NO_VALUE: &[u8] = &[];

fn ikey(id: i64) -> [u8; 8] {
    id.to_be_bytes()
}

fn pair_key(a: i64, b: i64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&a.to_be_bytes());
    key[8..].copy_from_slice(&b.to_be_bytes());
    key
}

/// 复合键的后 8 字节 / trailing 8 bytes of a composite key
fn tail_i64(key: &[u8]) -> i64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&key[key.len() - 8..]);
    i64::from_be_bytes(buf)
}

impl Storage {
    pub fn open(path: &str) -> Result<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// 进程内临时库，测试用 / In-process temporary database for tests
    pub fn open_temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self> {
        Ok(Self {
            users: db.open_tree("users")?,
            names: db.open_tree("names")?,
            friends: db.open_tree("friends")?,
            groups: db.open_tree("groups")?,
            gnames: db.open_tree("gnames")?,
            members: db.open_tree("members")?,
            member_of: db.open_tree("member_of")?,
            offline: db.open_tree("offline")?,
            meta: db.open_tree("meta")?,
            db,
        })
    }

    fn next_id(&self, counter: &str) -> Result<i64> {
        let bumped = self.meta.update_and_fetch(counter, |old| {
            let cur = old.map(tail_i64).unwrap_or(0);
            Some((cur + 1).to_be_bytes().to_vec())
        })?;
        // update_and_fetch 的闭包总是返回 Some / the closure always yields Some
        Ok(bumped.map(|v| tail_i64(&v)).unwrap_or(1))
    }

    pub fn query_user(&self, id: i64) -> Result<Option<UserRecord>> {
        match self.users.get(ikey(id))? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// 新用户以 offline 状态落库；重名由索引拒绝。
    /// New users land offline; duplicate names are rejected by the index.
    pub fn insert_user(&self, name: &str, password: &str) -> Result<i64> {
        let id = self.next_id("user")?;
        if self
            .names
            .compare_and_swap(name.as_bytes(), None as Option<&[u8]>, Some(&ikey(id)[..]))?
            .is_err()
        {
            bail!("display name {:?} already registered", name);
        }
        let rec = UserRecord {
            id,
            name: name.to_string(),
            password: password.to_string(),
            state: PresenceState::Offline,
        };
        self.users.insert(ikey(id), serde_json::to_vec(&rec)?)?;
        self.users.flush()?;
        Ok(id)
    }

    pub fn update_user_state(&self, id: i64, state: PresenceState) -> Result<()> {
        if let Some(raw) = self.users.get(ikey(id))? {
            let mut rec: UserRecord = serde_json::from_slice(&raw)?;
            rec.state = state;
            self.users.insert(ikey(id), serde_json::to_vec(&rec)?)?;
            self.users.flush()?;
        }
        Ok(())
    }

    /// 把所有在线用户置为离线，进程退出前调用。
    /// Flip every online user to offline; called before process exit.
    pub fn reset_all_state(&self) -> Result<usize> {
        let mut flipped = 0usize;
        for item in self.users.iter() {
            let (key, raw) = item?;
            let mut rec: UserRecord = serde_json::from_slice(&raw)?;
            if rec.state == PresenceState::Online {
                rec.state = PresenceState::Offline;
                self.users.insert(key, serde_json::to_vec(&rec)?)?;
                flipped += 1;
            }
        }
        self.users.flush()?;
        Ok(flipped)
    }

    pub fn query_friends(&self, id: i64) -> Result<Vec<UserRecord>> {
        let mut out = Vec::new();
        for item in self.friends.scan_prefix(ikey(id)) {
            let (key, _) = item?;
            if let Some(user) = self.query_user(tail_i64(&key))? {
                out.push(user);
            }
        }
        Ok(out)
    }

    /// 单向边，按调用原样插入 / Directed edge, inserted exactly as requested
    pub fn insert_friend_edge(&self, user: i64, friend: i64) -> Result<()> {
        self.friends.insert(pair_key(user, friend), NO_VALUE)?;
        self.friends.flush()?;
        Ok(())
    }

    pub fn create_group(&self, name: &str, desc: &str) -> Result<i64> {
        let id = self.next_id("group")?;
        if self
            .gnames
            .compare_and_swap(name.as_bytes(), None as Option<&[u8]>, Some(&ikey(id)[..]))?
            .is_err()
        {
            bail!("group name {:?} already taken", name);
        }
        let rec = GroupRecord { id, name: name.to_string(), desc: desc.to_string() };
        self.groups.insert(ikey(id), serde_json::to_vec(&rec)?)?;
        self.groups.flush()?;
        Ok(id)
    }

    pub fn add_membership(&self, group: i64, user: i64, role: MemberRole) -> Result<()> {
        if self.groups.get(ikey(group))?.is_none() {
            bail!("group {} does not exist", group);
        }
        if self.users.get(ikey(user))?.is_none() {
            bail!("user {} does not exist", user);
        }
        self.members.insert(pair_key(group, user), serde_json::to_vec(&role)?)?;
        self.member_of.insert(pair_key(user, group), NO_VALUE)?;
        self.members.flush()?;
        Ok(())
    }

    pub fn query_groups_with_members(&self, user: i64) -> Result<Vec<GroupWithMembers>> {
        let mut out = Vec::new();
        for item in self.member_of.scan_prefix(ikey(user)) {
            let (key, _) = item?;
            let group_id = tail_i64(&key);
            let Some(raw) = self.groups.get(ikey(group_id))? else { continue };
            let group: GroupRecord = serde_json::from_slice(&raw)?;
            let mut members = Vec::new();
            for member in self.members.scan_prefix(ikey(group_id)) {
                let (mkey, mval) = member?;
                let role: MemberRole = serde_json::from_slice(&mval)?;
                if let Some(rec) = self.query_user(tail_i64(&mkey))? {
                    members.push((rec, role));
                }
            }
            out.push(GroupWithMembers { group, members });
        }
        Ok(out)
    }

    pub fn query_group_member_ids(&self, group: i64) -> Result<Vec<i64>> {
        let mut out = Vec::new();
        for item in self.members.scan_prefix(ikey(group)) {
            let (key, _) = item?;
            out.push(tail_i64(&key));
        }
        Ok(out)
    }

    /// 按到达顺序追加 / Append in arrival order
    pub fn append_offline(&self, user: i64, payload: &str) -> Result<()> {
        let seq = self.next_id("offline_seq")?;
        self.offline.insert(pair_key(user, seq), payload.as_bytes())?;
        self.offline.flush()?;
        Ok(())
    }

    /// 整体取出并清空，保持 FIFO / Drain in full, FIFO preserved
    pub fn drain_offline(&self, user: i64) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut payloads = Vec::new();
        for item in self.offline.scan_prefix(ikey(user)) {
            let (key, val) = item?;
            payloads.push(String::from_utf8_lossy(&val).into_owned());
            keys.push(key);
        }
        for key in keys {
            self.offline.remove(key)?;
        }
        self.offline.flush()?;
        Ok(payloads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_ids_are_sequential_and_names_unique() {
        let store = Storage::open_temporary().unwrap();
        let a = store.insert_user("li", "pw1").unwrap();
        let b = store.insert_user("wang", "pw2").unwrap();
        assert_eq!(b, a + 1);
        assert!(store.insert_user("li", "other").is_err());
        let rec = store.query_user(a).unwrap().unwrap();
        assert_eq!(rec.state, PresenceState::Offline);
    }

    #[test]
    fn offline_queue_is_fifo_and_drains_once() {
        let store = Storage::open_temporary().unwrap();
        store.append_offline(9, "first").unwrap();
        store.append_offline(9, "second").unwrap();
        store.append_offline(4, "other-user").unwrap();
        assert_eq!(store.drain_offline(9).unwrap(), vec!["first", "second"]);
        assert!(store.drain_offline(9).unwrap().is_empty());
        assert_eq!(store.drain_offline(4).unwrap(), vec!["other-user"]);
    }

    #[test]
    fn group_roster_round_trip() {
        let store = Storage::open_temporary().unwrap();
        let creator = store.insert_user("zhao", "pw").unwrap();
        let member = store.insert_user("qian", "pw").unwrap();
        let gid = store.create_group("rust", "systems chat").unwrap();
        store.add_membership(gid, creator, MemberRole::Creator).unwrap();
        store.add_membership(gid, member, MemberRole::Normal).unwrap();

        let mut ids = store.query_group_member_ids(gid).unwrap();
        ids.sort_unstable();
        assert_eq!(ids, vec![creator, member]);

        let groups = store.query_groups_with_members(member).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].group.name, "rust");
        assert_eq!(groups[0].members.len(), 2);

        assert!(store.add_membership(gid + 100, member, MemberRole::Normal).is_err());
    }

    #[test]
    fn reset_flips_only_online_users() {
        let store = Storage::open_temporary().unwrap();
        let a = store.insert_user("sun", "pw").unwrap();
        let b = store.insert_user("zhou", "pw").unwrap();
        store.update_user_state(a, PresenceState::Online).unwrap();
        assert_eq!(store.reset_all_state().unwrap(), 1);
        assert_eq!(store.query_user(a).unwrap().unwrap().state, PresenceState::Offline);
        assert_eq!(store.query_user(b).unwrap().unwrap().state, PresenceState::Offline);
    }
}
