use anyhow::Result;

use super::{GroupWithMembers, MemberRole, PresenceState, Storage, UserRecord};

/// 持久化存储接口，便于测试替换 / Persistent store interface for testability
pub trait ChatStore: Send + Sync {
    fn query_user(&self, id: i64) -> Result<Option<UserRecord>>;
    fn insert_user(&self, name: &str, password: &str) -> Result<i64>;
    fn update_user_state(&self, id: i64, state: PresenceState) -> Result<()>;
    fn reset_all_state(&self) -> Result<usize>;
    fn query_friends(&self, id: i64) -> Result<Vec<UserRecord>>;
    fn insert_friend_edge(&self, user: i64, friend: i64) -> Result<()>;
    fn create_group(&self, name: &str, desc: &str) -> Result<i64>;
    fn add_membership(&self, group: i64, user: i64, role: MemberRole) -> Result<()>;
    fn query_groups_with_members(&self, user: i64) -> Result<Vec<GroupWithMembers>>;
    fn query_group_member_ids(&self, group: i64) -> Result<Vec<i64>>;
}

/// 离线消息队列接口 / Offline message queue interface
///
/// 每用户 FIFO；只支持整体取空，不支持部分读取。
/// Per-user FIFO; drained in bulk only, no partial reads.
pub trait OfflineStore: Send + Sync {
    fn append(&self, user: i64, payload: &str) -> Result<()>;
    fn drain_and_clear(&self, user: i64) -> Result<Vec<String>>;
}

impl ChatStore for Storage {
    fn query_user(&self, id: i64) -> Result<Option<UserRecord>> { Storage::query_user(self, id) }
    fn insert_user(&self, name: &str, password: &str) -> Result<i64> { Storage::insert_user(self, name, password) }
    fn update_user_state(&self, id: i64, state: PresenceState) -> Result<()> { Storage::update_user_state(self, id, state) }
    fn reset_all_state(&self) -> Result<usize> { Storage::reset_all_state(self) }
    fn query_friends(&self, id: i64) -> Result<Vec<UserRecord>> { Storage::query_friends(self, id) }
    fn insert_friend_edge(&self, user: i64, friend: i64) -> Result<()> { Storage::insert_friend_edge(self, user, friend) }
    fn create_group(&self, name: &str, desc: &str) -> Result<i64> { Storage::create_group(self, name, desc) }
    fn add_membership(&self, group: i64, user: i64, role: MemberRole) -> Result<()> { Storage::add_membership(self, group, user, role) }
    fn query_groups_with_members(&self, user: i64) -> Result<Vec<GroupWithMembers>> { Storage::query_groups_with_members(self, user) }
    fn query_group_member_ids(&self, group: i64) -> Result<Vec<i64>> { Storage::query_group_member_ids(self, group) }
}

impl OfflineStore for Storage {
    fn append(&self, user: i64, payload: &str) -> Result<()> { Storage::append_offline(self, user, payload) }
    fn drain_and_clear(&self, user: i64) -> Result<Vec<String>> { Storage::drain_offline(self, user) }
}
