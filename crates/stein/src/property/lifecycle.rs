//! Lifecycle policy properties.

use stein_common::value::{format_bool, format_ms_to_seconds, parse_bool, parse_seconds_to_ms};
use stein_common::{SteinError, SteinResult};

use crate::client::AccessLevel;
use crate::container::Prop;

use super::{PropCtx, Property, Registry};

struct Respawn;
static RESPAWN: Respawn = Respawn;

impl Property for Respawn {
    fn name(&self) -> &'static str {
        "respawn"
    }
    fn desc(&self) -> &'static str {
        "Automatically respawn a dead container (dynamic)"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::Respawn)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(format_bool(ctx.ct.to_respawn).to_string())
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive()?;
        ctx.ct.to_respawn = parse_bool(value)?;
        ctx.ct.set_prop(Prop::Respawn);
        Ok(())
    }
}

struct MaxRespawns;
static MAX_RESPAWNS: MaxRespawns = MaxRespawns;

impl Property for MaxRespawns {
    fn name(&self) -> &'static str {
        "max_respawns"
    }
    fn desc(&self) -> &'static str {
        "Respawn count limit, negative for unlimited (dynamic)"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::MaxRespawns)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.max_respawns.to_string())
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive()?;
        let max = value
            .trim()
            .parse()
            .map_err(|_| SteinError::invalid_value(format!("Invalid integer value {value}")))?;
        ctx.ct.max_respawns = max;
        ctx.ct.set_prop(Prop::MaxRespawns);
        Ok(())
    }
}

struct AgingTime;
static AGING_TIME: AgingTime = AgingTime;

impl Property for AgingTime {
    fn name(&self) -> &'static str {
        "aging_time"
    }
    fn desc(&self) -> &'static str {
        "Seconds a dead container lingers before automatic removal (dynamic)"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::AgingTime)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(format_ms_to_seconds(ctx.ct.aging_time))
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive()?;
        ctx.ct.aging_time = parse_seconds_to_ms(value)?;
        ctx.ct.set_prop(Prop::AgingTime);
        Ok(())
    }
}

struct Weak;
static WEAK: Weak = Weak;

impl Property for Weak {
    fn name(&self) -> &'static str {
        "weak"
    }
    fn desc(&self) -> &'static str {
        "Destroy the container when the creating client disconnects (dynamic)"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::Weak)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(format_bool(ctx.ct.is_weak).to_string())
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive()?;
        ctx.ct.is_weak = parse_bool(value)?;
        ctx.ct.set_prop(Prop::Weak);
        Ok(())
    }
}

struct EnableStein;
static ENABLE_STEIN: EnableStein = EnableStein;

impl Property for EnableStein {
    fn name(&self) -> &'static str {
        "enable_stein"
    }
    fn desc(&self) -> &'static str {
        "Management API access level: false | read-only | child-only | true (dynamic)"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::AccessLevel)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.access_level.format().to_string())
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive()?;
        let level = AccessLevel::parse(value)?;

        // a restrictive ancestor caps what unprivileged clients may grant
        if level > AccessLevel::ChildOnly && !ctx.restoring && !ctx.client.is_superuser() {
            let mut cursor = ctx.ct.parent.clone();
            while let Some(parent) = cursor.upgrade() {
                let parent = parent.read();
                if parent.access_level < AccessLevel::ChildOnly {
                    return Err(SteinError::permission(
                        "Parent container has access lower than child",
                    ));
                }
                cursor = parent.parent.clone();
            }
        }

        ctx.ct.access_level = level;
        ctx.ct.set_prop(Prop::AccessLevel);
        Ok(())
    }
}

struct Private;
static PRIVATE: Private = Private;

impl Property for Private {
    fn name(&self) -> &'static str {
        "private"
    }
    fn desc(&self) -> &'static str {
        "User-defined property (dynamic)"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::Private)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.private.clone())
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive()?;
        if value.len() > ctx.host.config.private_max {
            return Err(SteinError::invalid_value("Value is too long"));
        }
        ctx.ct.private = value.to_string();
        ctx.ct.set_prop(Prop::Private);
        Ok(())
    }
}

struct OomIsFatal;
static OOM_IS_FATAL: OomIsFatal = OomIsFatal;

impl Property for OomIsFatal {
    fn name(&self) -> &'static str {
        "oom_is_fatal"
    }
    fn desc(&self) -> &'static str {
        "Kill the whole container when the OOM killer fires (dynamic)"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::OomIsFatal)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(format_bool(ctx.ct.oom_is_fatal).to_string())
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive()?;
        ctx.ct.oom_is_fatal = parse_bool(value)?;
        ctx.ct.set_prop(Prop::OomIsFatal);
        Ok(())
    }
}

pub(super) fn register(registry: &mut Registry) {
    registry.add(&RESPAWN);
    registry.add(&MAX_RESPAWNS);
    registry.add(&AGING_TIME);
    registry.add(&WEAK);
    registry.add(&ENABLE_STEIN);
    registry.add(&PRIVATE);
    registry.add(&OOM_IS_FATAL);
}
