//! Execution properties: command, environment, limits, identities.

use std::collections::BTreeMap;

use stein_common::value::{format_bool, merge_escaped, parse_bool, parse_size, split_escaped};
use stein_common::{Cred, SteinError, SteinResult};

use crate::cgroup::Controllers;
use crate::container::{Prop, UlimitEntry, VirtMode, RLIMIT_NAMES};

use super::{PropCtx, Property, Registry};

struct Command;
static COMMAND: Command = Command;

impl Property for Command {
    fn name(&self) -> &'static str {
        "command"
    }
    fn desc(&self) -> &'static str {
        "Command executed on container start"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::Command)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.command.clone())
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive_and_stopped()?;
        ctx.ct.command = value.to_string();
        ctx.ct.set_prop(Prop::Command);
        Ok(())
    }
}

fn parse_env_entry(entry: &str) -> SteinResult<(&str, &str)> {
    match entry.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name, value)),
        _ => Err(SteinError::invalid_value(format!(
            "Invalid environment variable: {entry}"
        ))),
    }
}

struct Env;
static ENV: Env = Env;

impl Property for Env {
    fn name(&self) -> &'static str {
        "env"
    }
    fn desc(&self) -> &'static str {
        "Environment of the container task: <name>=<value>; ..."
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::Env)
    }
    fn indexable(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(merge_escaped(&ctx.ct.env_cfg, ';'))
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive_and_stopped()?;
        let entries = split_escaped(value, ';');
        for entry in &entries {
            parse_env_entry(entry)?;
        }
        ctx.ct.env_cfg = entries;
        ctx.ct.set_prop(Prop::Env);
        Ok(())
    }
    fn get_indexed(&self, ctx: &mut PropCtx, index: &str) -> SteinResult<String> {
        // own environment first, then inherited entries up the chain
        for entry in &ctx.ct.env_cfg {
            if let Ok((name, value)) = parse_env_entry(entry) {
                if name == index {
                    return Ok(value.to_string());
                }
            }
        }
        let mut cursor = ctx.ct.parent.clone();
        while let Some(parent) = cursor.upgrade() {
            let parent = parent.read();
            for entry in &parent.env_cfg {
                if let Ok((name, value)) = parse_env_entry(entry) {
                    if name == index {
                        return Ok(value.to_string());
                    }
                }
            }
            cursor = parent.parent.clone();
        }
        Err(SteinError::invalid_value(format!(
            "Variable {index} not defined"
        )))
    }
    fn set_indexed(&self, ctx: &mut PropCtx, index: &str, value: &str) -> SteinResult<()> {
        ctx.alive_and_stopped()?;
        let entry = format!("{index}={value}");
        parse_env_entry(&entry)?;
        if let Some(existing) = ctx
            .ct
            .env_cfg
            .iter_mut()
            .find(|e| e.split_once('=').is_some_and(|(name, _)| name == index))
        {
            *existing = entry;
        } else {
            ctx.ct.env_cfg.push(entry);
        }
        ctx.ct.set_prop(Prop::Env);
        Ok(())
    }
}

fn parse_ulimit_value(name: &str, value: &str) -> SteinResult<UlimitEntry> {
    let fields: Vec<&str> = value.split_whitespace().collect();
    if fields.len() != 2 {
        return Err(SteinError::invalid_value(format!(
            "Invalid limits number for {name}"
        )));
    }
    let parse_one = |field: &str| -> SteinResult<Option<u64>> {
        if field == "unlim" || field == "unlimited" {
            Ok(None)
        } else {
            field
                .parse()
                .map(Some)
                .map_err(|_| SteinError::invalid_value(format!("Invalid limit for {name}: {field}")))
        }
    };
    Ok(UlimitEntry {
        soft: parse_one(fields[0])?,
        hard: parse_one(fields[1])?,
    })
}

fn check_ulimit_name(name: &str) -> SteinResult<()> {
    if RLIMIT_NAMES.contains(&name) {
        Ok(())
    } else {
        Err(SteinError::invalid_value(format!("Invalid limit {name}")))
    }
}

fn format_ulimit_entry(entry: &UlimitEntry) -> String {
    let fmt = |v: Option<u64>| v.map_or_else(|| "unlimited".to_string(), |v| v.to_string());
    format!("{} {}", fmt(entry.soft), fmt(entry.hard))
}

struct Ulimit;
static ULIMIT: Ulimit = Ulimit;

impl Property for Ulimit {
    fn name(&self) -> &'static str {
        "ulimit"
    }
    fn desc(&self) -> &'static str {
        "Task resource limits: <type>: <soft> <hard>; ... (see getrlimit)"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::Ulimit)
    }
    fn indexable(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        let entries: Vec<String> = ctx
            .ct
            .ulimits
            .iter()
            .map(|(name, entry)| format!("{name}: {}", format_ulimit_entry(entry)))
            .collect();
        Ok(entries.join("; "))
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive()?;
        // build the whole new table first so a bad entry changes nothing
        let mut limits = BTreeMap::new();
        for entry in split_escaped(value, ';') {
            let (name, value) = entry.split_once(':').ok_or_else(|| {
                SteinError::invalid_value(format!("Invalid limits format: {entry}"))
            })?;
            let name = name.trim();
            check_ulimit_name(name)?;
            limits.insert(name.to_string(), parse_ulimit_value(name, value)?);
        }
        ctx.ct.ulimits = limits;
        ctx.ct.set_prop(Prop::Ulimit);
        Ok(())
    }
    fn get_indexed(&self, ctx: &mut PropCtx, index: &str) -> SteinResult<String> {
        check_ulimit_name(index)?;
        ctx.ct
            .ulimits
            .get(index)
            .map(format_ulimit_entry)
            .ok_or_else(|| SteinError::invalid_value(format!("Limit {index} not set")))
    }
    fn set_indexed(&self, ctx: &mut PropCtx, index: &str, value: &str) -> SteinResult<()> {
        ctx.alive()?;
        check_ulimit_name(index)?;
        if value.trim().is_empty() {
            ctx.ct.ulimits.remove(index);
        } else {
            ctx.ct
                .ulimits
                .insert(index.to_string(), parse_ulimit_value(index, value)?);
        }
        ctx.ct.set_prop(Prop::Ulimit);
        Ok(())
    }
}

struct Isolate;
static ISOLATE: Isolate = Isolate;

impl Property for Isolate {
    fn name(&self) -> &'static str {
        "isolate"
    }
    fn desc(&self) -> &'static str {
        "Isolate the pid namespace from the parent"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::Isolate)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(format_bool(ctx.ct.isolate).to_string())
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive_and_stopped()?;
        ctx.ct.isolate = parse_bool(value)?;
        ctx.ct.set_prop(Prop::Isolate);
        Ok(())
    }
}

struct VirtModeProp;
static VIRT_MODE: VirtModeProp = VirtModeProp;

impl Property for VirtModeProp {
    fn name(&self) -> &'static str {
        "virt_mode"
    }
    fn desc(&self) -> &'static str {
        "Virtualization mode: app|os"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::VirtMode)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.virt_mode.as_str().to_string())
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive_and_stopped()?;
        ctx.ct.virt_mode = VirtMode::parse(value)?;
        ctx.ct.set_prop(Prop::VirtMode);
        ctx.ct.sanitize_capabilities(ctx.host.info.has_ambient_caps);
        Ok(())
    }
}

/// Whether the target container sits inside the client's own subtree.
fn in_client_subtree(ctx: &PropCtx) -> bool {
    let client_ct = ctx.client.container_name();
    client_ct == "/" || ctx.ct.name.starts_with(&format!("{client_ct}/"))
}

struct TaskUser;
static USER: TaskUser = TaskUser;

impl Property for TaskUser {
    fn name(&self) -> &'static str {
        "user"
    }
    fn desc(&self) -> &'static str {
        "Run the command as the given user"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::TaskUser)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.host.users.user_name(ctx.ct.task_cred.uid))
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive_and_stopped()?;

        let old_gid = ctx.ct.task_cred.gid;
        let mut cred = match ctx.host.users.load_user(value) {
            Ok(cred) => cred,
            Err(err) => {
                // uid/gid-capable clients may name an arbitrary numeric id
                if ctx.client.can_set_uid_gid() || ctx.restoring {
                    match value.parse::<u32>() {
                        Ok(uid) => Cred::new(uid, old_gid),
                        Err(_) => return Err(err),
                    }
                } else {
                    return Err(err);
                }
            }
        };

        // keep the current group when the new user is entitled to it
        if cred.is_member_of(old_gid)
            || ctx.client.cred().is_member_of(old_gid)
            || ctx.client.is_superuser()
        {
            cred.gid = old_gid;
        }

        if !ctx.restoring {
            let permitted = ctx.client.can_control(&cred).is_ok()
                || (ctx.client.can_set_uid_gid() && in_client_subtree(ctx));
            if !permitted {
                return Err(SteinError::permission(format!(
                    "Client {} cannot set user {value}",
                    ctx.client.cred()
                )));
            }
        }

        ctx.ct.task_cred = cred;
        ctx.ct.set_prop(Prop::TaskUser);
        ctx.ct.sanitize_capabilities(ctx.host.info.has_ambient_caps);
        Ok(())
    }
}

struct TaskGroup;
static GROUP: TaskGroup = TaskGroup;

impl Property for TaskGroup {
    fn name(&self) -> &'static str {
        "group"
    }
    fn desc(&self) -> &'static str {
        "Run the command with the given group"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::TaskGroup)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.host.users.group_name(ctx.ct.task_cred.gid))
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive_and_stopped()?;

        let gid = match ctx.host.users.group_id(value) {
            Ok(gid) => gid,
            Err(err) => {
                if ctx.client.can_set_uid_gid() || ctx.restoring {
                    value.parse::<u32>().map_err(|_| err)?
                } else {
                    return Err(err);
                }
            }
        };

        if !ctx.restoring
            && !ctx.ct.task_cred.is_member_of(gid)
            && !ctx.client.cred().is_member_of(gid)
            && !ctx.client.is_superuser()
        {
            return Err(SteinError::permission(format!(
                "Desired group {value} is not in the supplementary group list"
            )));
        }

        ctx.ct.task_cred.gid = gid;
        ctx.ct.set_prop(Prop::TaskGroup);
        Ok(())
    }
}

struct OwnerUser;
static OWNER_USER: OwnerUser = OwnerUser;

impl Property for OwnerUser {
    fn name(&self) -> &'static str {
        "owner_user"
    }
    fn desc(&self) -> &'static str {
        "User owning the container"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::OwnerUser)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.host.users.user_name(ctx.ct.owner_cred.uid))
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        let cred = ctx.host.users.load_user(value)?;
        if !ctx.restoring {
            ctx.client.can_control(&cred)?;
        }
        ctx.ct.owner_cred.uid = cred.uid;
        ctx.ct.owner_cred.groups = cred.groups;
        ctx.ct.set_prop(Prop::OwnerUser);
        ctx.ct.sanitize_capabilities(ctx.host.info.has_ambient_caps);
        Ok(())
    }
}

struct OwnerGroup;
static OWNER_GROUP: OwnerGroup = OwnerGroup;

impl Property for OwnerGroup {
    fn name(&self) -> &'static str {
        "owner_group"
    }
    fn desc(&self) -> &'static str {
        "Group owning the container"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::OwnerGroup)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.host.users.group_name(ctx.ct.owner_cred.gid))
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        let gid = ctx.host.users.group_id(value)?;
        if !ctx.restoring
            && !ctx.ct.owner_cred.is_member_of(gid)
            && !ctx.client.cred().is_member_of(gid)
            && !ctx.client.is_superuser()
        {
            return Err(SteinError::permission(format!(
                "Desired group {value} is not in the supplementary group list"
            )));
        }
        ctx.ct.owner_cred.gid = gid;
        ctx.ct.set_prop(Prop::OwnerGroup);
        ctx.ct.sanitize_capabilities(ctx.host.info.has_ambient_caps);
        Ok(())
    }
}

struct ThreadLimit;
static THREAD_LIMIT: ThreadLimit = ThreadLimit;

impl Property for ThreadLimit {
    fn name(&self) -> &'static str {
        "thread_limit"
    }
    fn desc(&self) -> &'static str {
        "Thread count limit for the container subtree"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::ThreadLimit)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.thread_limit.to_string())
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        let limit = parse_size(value)?;
        ctx.want_controllers(Controllers::PIDS)?;
        ctx.ct.thread_limit = limit;
        ctx.ct.set_prop(Prop::ThreadLimit);
        Ok(())
    }
}

pub(super) fn register(registry: &mut Registry) {
    registry.add(&COMMAND);
    registry.add(&ENV);
    registry.add(&ULIMIT);
    registry.add(&ISOLATE);
    registry.add(&VIRT_MODE);
    registry.add(&USER);
    registry.add(&GROUP);
    registry.add(&OWNER_USER);
    registry.add(&OWNER_GROUP);
    registry.add(&THREAD_LIMIT);
}
