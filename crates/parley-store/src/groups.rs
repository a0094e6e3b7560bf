use parley_shared::Address;
use rusqlite::params;

use crate::database::Database;
use crate::error::Result;
use crate::models::GroupMember;

impl Database {
    /// Replace the member list of `group`.
    pub fn set_group_members(&self, group: &Address, members: &[GroupMember]) -> Result<()> {
        {
            let mut conn = self.conn();
            let tx = conn.transaction()?;
            let group_key = group.to_string();

            tx.execute(
                "DELETE FROM group_members WHERE group_address = ?1",
                params![group_key],
            )?;
            for member in members {
                tx.execute(
                    "INSERT OR REPLACE INTO group_members (group_address, member_address, is_admin)
                     VALUES (?1, ?2, ?3)",
                    params![group_key, member.address.to_string(), member.is_admin],
                )?;
            }
            tx.commit()?;
        }

        tracing::debug!(group = %group.debug_string(), members = members.len(), "group members replaced");
        self.notify_recipient(group);
        Ok(())
    }

    /// Members of `group`, admins first.
    pub fn group_members(&self, group: &Address) -> Result<Vec<GroupMember>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT member_address, is_admin FROM group_members
             WHERE group_address = ?1 ORDER BY is_admin DESC, member_address ASC",
        )?;
        let rows = stmt.query_map(params![group.to_string()], |row| {
            let address: String = row.get(0)?;
            Ok(GroupMember {
                address: Address::from_serialized(&address),
                is_admin: row.get(1)?,
            })
        })?;

        let mut members = Vec::new();
        for row in rows {
            members.push(row?);
        }
        Ok(members)
    }

    /// Groups `member` belongs to.
    pub fn groups_containing(&self, member: &Address) -> Result<Vec<Address>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT group_address FROM group_members WHERE member_address = ?1 ORDER BY group_address",
        )?;
        let rows = stmt.query_map(params![member.to_string()], |row| row.get::<_, String>(0))?;

        let mut groups = Vec::new();
        for row in rows {
            groups.push(Address::from_serialized(&row?));
        }
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: &str) -> Address {
        Address::from_serialized(&format!("05{}", byte.repeat(32)))
    }

    fn group() -> Address {
        Address::from_serialized(&format!("03{}", "99".repeat(32)))
    }

    #[test]
    fn replace_members() {
        let db = Database::in_memory().unwrap();
        db.set_group_members(
            &group(),
            &[
                GroupMember { address: addr("11"), is_admin: false },
                GroupMember { address: addr("22"), is_admin: true },
            ],
        )
        .unwrap();

        let members = db.group_members(&group()).unwrap();
        assert_eq!(members.len(), 2);
        assert!(members[0].is_admin);
        assert_eq!(db.groups_containing(&addr("11")).unwrap(), vec![group()]);

        db.set_group_members(&group(), &[GroupMember { address: addr("33"), is_admin: false }])
            .unwrap();
        assert_eq!(db.group_members(&group()).unwrap().len(), 1);
        assert!(db.groups_containing(&addr("11")).unwrap().is_empty());
    }
}
