//! Hidden raw properties, persisted for daemon restart only.

use stein_common::value::split_escaped;
use stein_common::{SteinError, SteinResult};

use crate::container::Prop;

use super::{PropCtx, Property, Registry};

fn parse_num<T: std::str::FromStr>(value: &str) -> SteinResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SteinError::invalid_value(format!("Bad integer value: {value}")))
}

struct RawRootPid;
static RAW_ROOT_PID: RawRootPid = RawRootPid;

impl Property for RawRootPid {
    fn name(&self) -> &'static str {
        "_root_pid"
    }
    fn desc(&self) -> &'static str {
        ""
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::RootPid)
    }
    fn read_only(&self) -> bool {
        true
    }
    fn hidden(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(format!(
            "{};{};{}",
            ctx.ct.task_pid, ctx.ct.task_vpid, ctx.ct.wait_task_pid
        ))
    }
    fn restore(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        let fields = split_escaped(value, ';');
        ctx.ct.task_pid = fields.first().map(|s| parse_num(s)).transpose()?.unwrap_or(0);
        ctx.ct.task_vpid = fields.get(1).map(|s| parse_num(s)).transpose()?.unwrap_or(0);
        ctx.ct.wait_task_pid = fields
            .get(2)
            .map(|s| parse_num(s))
            .transpose()?
            .unwrap_or(ctx.ct.task_pid);
        ctx.ct.set_prop(Prop::RootPid);
        Ok(())
    }
}

struct RawSeizePid;
static RAW_SEIZE_PID: RawSeizePid = RawSeizePid;

impl Property for RawSeizePid {
    fn name(&self) -> &'static str {
        "_seize_pid"
    }
    fn desc(&self) -> &'static str {
        ""
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::SeizePid)
    }
    fn read_only(&self) -> bool {
        true
    }
    fn hidden(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.seize_task_pid.to_string())
    }
    fn restore(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.ct.seize_task_pid = parse_num(value)?;
        ctx.ct.set_prop(Prop::SeizePid);
        Ok(())
    }
}

struct RawLoopDev;
static RAW_LOOP_DEV: RawLoopDev = RawLoopDev;

impl Property for RawLoopDev {
    fn name(&self) -> &'static str {
        "_loop_dev"
    }
    fn desc(&self) -> &'static str {
        ""
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::LoopDev)
    }
    fn read_only(&self) -> bool {
        true
    }
    fn hidden(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.loop_dev.to_string())
    }
    fn restore(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.ct.loop_dev = parse_num(value)?;
        ctx.ct.set_prop(Prop::LoopDev);
        Ok(())
    }
}

struct RawStartTime;
static RAW_START_TIME: RawStartTime = RawStartTime;

impl Property for RawStartTime {
    fn name(&self) -> &'static str {
        "_start_time"
    }
    fn desc(&self) -> &'static str {
        ""
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::StartTime)
    }
    fn read_only(&self) -> bool {
        true
    }
    fn hidden(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.start_time.to_string())
    }
    fn restore(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.ct.start_time = parse_num(value)?;
        ctx.ct.set_prop(Prop::StartTime);
        Ok(())
    }
}

struct RawDeathTime;
static RAW_DEATH_TIME: RawDeathTime = RawDeathTime;

impl Property for RawDeathTime {
    fn name(&self) -> &'static str {
        "_death_time"
    }
    fn desc(&self) -> &'static str {
        ""
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::DeathTime)
    }
    fn read_only(&self) -> bool {
        true
    }
    fn hidden(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.death_time.to_string())
    }
    fn restore(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.ct.death_time = parse_num(value)?;
        ctx.ct.set_prop(Prop::DeathTime);
        Ok(())
    }
}

struct RawCreationTime;
static RAW_CREATION_TIME: RawCreationTime = RawCreationTime;

impl Property for RawCreationTime {
    fn name(&self) -> &'static str {
        "_creation_time"
    }
    fn desc(&self) -> &'static str {
        ""
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::CreationTime)
    }
    fn read_only(&self) -> bool {
        true
    }
    fn hidden(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.real_creation_time.to_string())
    }
    fn restore(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.ct.real_creation_time = parse_num(value)?;
        ctx.ct.set_prop(Prop::CreationTime);
        Ok(())
    }
}

pub(super) fn register(registry: &mut Registry) {
    registry.add(&RAW_ROOT_PID);
    registry.add(&RAW_SEIZE_PID);
    registry.add(&RAW_LOOP_DEV);
    registry.add(&RAW_START_TIME);
    registry.add(&RAW_DEATH_TIME);
    registry.add(&RAW_CREATION_TIME);
}
