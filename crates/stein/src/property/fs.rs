//! Identity and filesystem properties.

use stein_common::value::{format_bool, format_octal, merge_escaped, parse_bool, parse_octal,
                          split_escaped, split_multi};
use stein_common::{SteinError, SteinResult};

use crate::cgroup::Controllers;
use crate::container::{BindAccess, BindMount, Prop};

use super::{PropCtx, Property, Registry};

struct Cwd;
static CWD: Cwd = Cwd;

impl Property for Cwd {
    fn name(&self) -> &'static str {
        "cwd"
    }
    fn desc(&self) -> &'static str {
        "Container working directory"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::Cwd)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        if ctx.ct.cwd.is_empty() {
            Ok("/".to_string())
        } else {
            Ok(ctx.ct.cwd.clone())
        }
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive_and_stopped()?;
        ctx.ct.cwd = value.to_string();
        ctx.ct.set_prop(Prop::Cwd);
        Ok(())
    }
}

struct RootPath;
static ROOT: RootPath = RootPath;

impl Property for RootPath {
    fn name(&self) -> &'static str {
        "root"
    }
    fn desc(&self) -> &'static str {
        "Container root directory (the task is chrooted into it)"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::Root)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.root.clone())
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive_and_stopped()?;
        if value.is_empty() {
            return Err(SteinError::invalid_value("Empty root path"));
        }
        ctx.ct.root = value.to_string();
        ctx.ct.set_prop(Prop::Root);
        Ok(())
    }
}

struct RootRo;
static ROOT_RDONLY: RootRo = RootRo;

impl Property for RootRo {
    fn name(&self) -> &'static str {
        "root_readonly"
    }
    fn desc(&self) -> &'static str {
        "Mount the root directory read-only"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::RootRo)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(format_bool(ctx.ct.root_ro).to_string())
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive_and_stopped()?;
        ctx.ct.root_ro = parse_bool(value)?;
        ctx.ct.set_prop(Prop::RootRo);
        Ok(())
    }
}

struct Umask;
static UMASK: Umask = Umask;

impl Property for Umask {
    fn name(&self) -> &'static str {
        "umask"
    }
    fn desc(&self) -> &'static str {
        "File mode creation mask"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::Umask)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(format_octal(ctx.ct.umask))
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive_and_stopped()?;
        ctx.ct.umask = parse_octal(value)?;
        ctx.ct.set_prop(Prop::Umask);
        Ok(())
    }
}

struct Bind;
static BIND: Bind = Bind;

impl Property for Bind {
    fn name(&self) -> &'static str {
        "bind"
    }
    fn desc(&self) -> &'static str {
        "Share host directories with the container: <host> <dest> [ro|rw]; ..."
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::Bind)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        let entries: Vec<String> = ctx
            .ct
            .bind_mounts
            .iter()
            .map(|bm| {
                let access = match bm.access {
                    BindAccess::Inherit => "",
                    BindAccess::ReadOnly => " ro",
                    BindAccess::ReadWrite => " rw",
                };
                format!("{} {}{}", bm.source, bm.dest, access)
            })
            .collect();
        Ok(merge_escaped(&entries, ';'))
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive_and_stopped()?;

        let mut mounts = Vec::new();
        for tuple in split_multi(value, ' ', ';') {
            if tuple.len() != 2 && tuple.len() != 3 {
                return Err(SteinError::invalid_value(format!(
                    "Invalid bind entry: {}",
                    tuple.join(" ")
                )));
            }
            let access = match tuple.get(2).map(String::as_str) {
                None => BindAccess::Inherit,
                Some("ro") => BindAccess::ReadOnly,
                Some("rw") => BindAccess::ReadWrite,
                Some(other) => {
                    return Err(SteinError::invalid_value(format!(
                        "Invalid bind mode: {other}"
                    )))
                }
            };
            mounts.push(BindMount {
                source: tuple[0].clone(),
                dest: tuple[1].clone(),
                access,
            });
        }

        ctx.ct.bind_mounts = mounts;
        ctx.ct.set_prop(Prop::Bind);
        Ok(())
    }
}

struct BindDns;
static BIND_DNS: BindDns = BindDns;

impl Property for BindDns {
    fn name(&self) -> &'static str {
        "bind_dns"
    }
    fn desc(&self) -> &'static str {
        "Bind the host resolv.conf and hosts files into the container root"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::BindDns)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(format_bool(ctx.ct.bind_dns).to_string())
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive_and_stopped()?;
        ctx.ct.bind_dns = parse_bool(value)?;
        ctx.ct.set_prop(Prop::BindDns);
        Ok(())
    }
}

struct Hostname;
static HOSTNAME: Hostname = Hostname;

impl Property for Hostname {
    fn name(&self) -> &'static str {
        "hostname"
    }
    fn desc(&self) -> &'static str {
        "Container hostname"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::Hostname)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.hostname.clone())
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive_and_stopped()?;
        ctx.ct.hostname = value.to_string();
        ctx.ct.set_prop(Prop::Hostname);
        Ok(())
    }
}

struct ResolvConf;
static RESOLV_CONF: ResolvConf = ResolvConf;

impl Property for ResolvConf {
    fn name(&self) -> &'static str {
        "resolv_conf"
    }
    fn desc(&self) -> &'static str {
        "DNS resolver configuration: <resolv.conf line>; ..."
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::ResolvConf)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(merge_escaped(&ctx.ct.resolv_conf, ';'))
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive_and_stopped()?;
        ctx.ct.resolv_conf = split_escaped(value, ';');
        ctx.ct.set_prop(Prop::ResolvConf);
        Ok(())
    }
}

struct Devices;
static DEVICES: Devices = Devices;

impl Property for Devices {
    fn name(&self) -> &'static str {
        "devices"
    }
    fn desc(&self) -> &'static str {
        "Devices the container can access: <device> [r][w][m][-] [name] [mode] [user] [group]; ..."
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::Devices)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(merge_escaped(&ctx.ct.devices, ';'))
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        let entries = split_escaped(value, ';');
        for entry in &entries {
            let device = split_escaped(entry, ' ');
            if device.is_empty() || !device[0].starts_with('/') {
                return Err(SteinError::invalid_value(format!(
                    "Invalid device entry: {entry}"
                )));
            }
        }
        ctx.want_controllers(Controllers::DEVICES)?;
        ctx.ct.devices = entries;
        ctx.ct.set_prop(Prop::Devices);
        Ok(())
    }
}

struct NsName;
static STEIN_NAMESPACE: NsName = NsName;

impl Property for NsName {
    fn name(&self) -> &'static str {
        "stein_namespace"
    }
    fn desc(&self) -> &'static str {
        "Container namespace prefix applied to child names"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::Namespace)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.ns_name.clone())
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive_and_stopped()?;
        ctx.ct.ns_name = value.to_string();
        ctx.ct.set_prop(Prop::Namespace);
        Ok(())
    }
}

pub(super) fn register(registry: &mut Registry) {
    registry.add(&CWD);
    registry.add(&ROOT);
    registry.add(&ROOT_RDONLY);
    registry.add(&UMASK);
    registry.add(&BIND);
    registry.add(&BIND_DNS);
    registry.add(&HOSTNAME);
    registry.add(&RESOLV_CONF);
    registry.add(&DEVICES);
    registry.add(&STEIN_NAMESPACE);
}
