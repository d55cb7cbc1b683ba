use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use limitapt_core::{GroupSettings, ROOT_USERNAME};
use limitapt_policy::Actor;
use nix::unistd::{getuid, User};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("group \"{group}\" does not exist")]
    GroupNotExist { group: String },
    #[error("cannot find a user name for uid {uid}")]
    UnknownUid { uid: u32 },
    #[error("only root may act on behalf of another user")]
    ForeignUser,
    #[error("failed reading {}", .path.display())]
    Reading {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    pub name: String,
    pub gid: u32,
    pub members: Vec<String>,
}

/// Supplementary group membership as listed in a `group(5)` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupDatabase {
    groups: Vec<GroupEntry>,
}

impl GroupDatabase {
    pub fn load(path: &Path) -> Result<Self, IdentityError> {
        let contents = fs::read_to_string(path).map_err(|source| IdentityError::Reading {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&contents))
    }

    /// Lines that do not look like `name:password:gid:members` are skipped.
    pub fn parse(contents: &str) -> Self {
        let groups = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(parse_group_line)
            .collect();
        Self { groups }
    }

    pub fn get(&self, group: &str) -> Option<&GroupEntry> {
        self.groups.iter().find(|entry| entry.name == group)
    }

    pub fn is_member(&self, group: &str, user: &str) -> Result<bool, IdentityError> {
        let entry = self.get(group).ok_or_else(|| IdentityError::GroupNotExist {
            group: group.to_string(),
        })?;
        Ok(entry.members.iter().any(|member| member == user))
    }
}

fn parse_group_line(line: &str) -> Option<GroupEntry> {
    let mut fields = line.split(':');
    let name = fields.next().filter(|name| !name.is_empty())?;
    let _password = fields.next()?;
    let gid = fields.next()?.parse().ok()?;
    let members = fields
        .next()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|member| !member.is_empty())
        .map(str::to_string)
        .collect();
    Some(GroupEntry {
        name: name.to_string(),
        gid,
        members,
    })
}

/// Who is running the program and what they are allowed to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Login name the program was invoked for.
    pub login: String,
    /// `root` for members of the roots group, otherwise the login.
    pub username: String,
    pub may_modify: bool,
    pub may_upgrade: bool,
}

impl Identity {
    pub fn root() -> Self {
        Self {
            login: ROOT_USERNAME.to_string(),
            username: ROOT_USERNAME.to_string(),
            may_modify: true,
            may_upgrade: true,
        }
    }

    /// Group lookups only happen for non-root logins, so a missing group is
    /// reported only when it matters.
    pub fn resolve(
        login: &str,
        groups: &GroupDatabase,
        settings: &GroupSettings,
    ) -> Result<Self, IdentityError> {
        if login == ROOT_USERNAME || groups.is_member(&settings.roots, login)? {
            return Ok(Self {
                login: login.to_string(),
                ..Self::root()
            });
        }
        let identity = Self {
            login: login.to_string(),
            username: login.to_string(),
            may_modify: groups.is_member(&settings.users, login)?,
            may_upgrade: groups.is_member(&settings.upgraders, login)?,
        };
        debug!(
            username = %identity.username,
            may_modify = identity.may_modify,
            may_upgrade = identity.may_upgrade,
            "resolved identity"
        );
        Ok(identity)
    }

    pub fn is_root(&self) -> bool {
        self.username == ROOT_USERNAME
    }

    pub fn actor(&self) -> Actor {
        Actor::new(self.username.clone(), self.may_upgrade)
    }
}

/// Login of the calling process. Only root may name somebody else, which is
/// how a privilege wrapper passes the original caller through.
pub fn invoking_login(requested: Option<&str>) -> Result<String, IdentityError> {
    let uid = getuid();
    match requested {
        Some(name) if uid.is_root() => return Ok(name.to_string()),
        Some(_) => return Err(IdentityError::ForeignUser),
        None => {}
    }
    if uid.is_root() {
        return Ok(ROOT_USERNAME.to_string());
    }
    match User::from_uid(uid) {
        Ok(Some(user)) => Ok(user.name),
        _ => Err(IdentityError::UnknownUid { uid: uid.as_raw() }),
    }
}
