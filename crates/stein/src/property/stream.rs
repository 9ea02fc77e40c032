//! Standard stream properties.

use stein_common::value::parse_size;
use stein_common::{SteinError, SteinResult};

use crate::container::Prop;

use super::{PropCtx, Property, Registry};

/// Parse the `[offset][:length]` subscript of stdout/stderr reads.
fn parse_read_range(index: &str) -> SteinResult<(Option<u64>, Option<u64>)> {
    let (offset, length) = match index.split_once(':') {
        Some((offset, length)) => (offset, Some(length)),
        None => (index, None),
    };
    let parse = |s: &str| -> SteinResult<Option<u64>> {
        let s = s.trim();
        if s.is_empty() {
            Ok(None)
        } else {
            s.parse()
                .map(Some)
                .map_err(|_| SteinError::invalid_value(format!("Invalid offset: {index}")))
        }
    };
    Ok((parse(offset)?, length.map(parse).transpose()?.flatten()))
}

struct StdinPath;
static STDIN_PATH: StdinPath = StdinPath;

impl Property for StdinPath {
    fn name(&self) -> &'static str {
        "stdin_path"
    }
    fn desc(&self) -> &'static str {
        "Standard input path"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::Stdin)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.stdin.path.clone())
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive_and_stopped()?;
        ctx.ct.stdin.path = value.to_string();
        ctx.ct.set_prop(Prop::Stdin);
        Ok(())
    }
}

struct StdoutPath;
static STDOUT_PATH: StdoutPath = StdoutPath;

impl Property for StdoutPath {
    fn name(&self) -> &'static str {
        "stdout_path"
    }
    fn desc(&self) -> &'static str {
        "Standard output path"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::Stdout)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.stdout.path.clone())
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive_and_stopped()?;
        ctx.ct.stdout.path = value.to_string();
        ctx.ct.set_prop(Prop::Stdout);
        Ok(())
    }
}

struct StderrPath;
static STDERR_PATH: StderrPath = StderrPath;

impl Property for StderrPath {
    fn name(&self) -> &'static str {
        "stderr_path"
    }
    fn desc(&self) -> &'static str {
        "Standard error path"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::Stderr)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.stderr.path.clone())
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive_and_stopped()?;
        ctx.ct.stderr.path = value.to_string();
        ctx.ct.set_prop(Prop::Stderr);
        Ok(())
    }
}

struct StdoutLimit;
static STDOUT_LIMIT: StdoutLimit = StdoutLimit;

impl Property for StdoutLimit {
    fn name(&self) -> &'static str {
        "stdout_limit"
    }
    fn desc(&self) -> &'static str {
        "Limit for stored stdout and stderr size (dynamic)"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::StdoutLimit)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.stdout.limit.to_string())
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        let limit = parse_size(value)?;
        let max = ctx.host.config.stdout_limit_max;
        if limit > max && !ctx.client.is_superuser() && !ctx.restoring {
            return Err(SteinError::invalid_value(format!("Maximum limit is: {max}")));
        }
        // one knob covers both output streams
        ctx.ct.stdout.limit = limit;
        ctx.ct.stderr.limit = limit;
        ctx.ct.set_prop(Prop::StdoutLimit);
        Ok(())
    }
}

struct StdoutOffset;
static STDOUT_OFFSET: StdoutOffset = StdoutOffset;

impl Property for StdoutOffset {
    fn name(&self) -> &'static str {
        "stdout_offset"
    }
    fn desc(&self) -> &'static str {
        "Bytes rotated out of stored stdout (ro)"
    }
    fn read_only(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        ctx.runtime_readable(self.name())?;
        Ok(ctx.ct.stdout.offset.to_string())
    }
}

struct StderrOffset;
static STDERR_OFFSET: StderrOffset = StderrOffset;

impl Property for StderrOffset {
    fn name(&self) -> &'static str {
        "stderr_offset"
    }
    fn desc(&self) -> &'static str {
        "Bytes rotated out of stored stderr (ro)"
    }
    fn read_only(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        ctx.runtime_readable(self.name())?;
        Ok(ctx.ct.stderr.offset.to_string())
    }
}

struct Stdout;
static STDOUT: Stdout = Stdout;

impl Property for Stdout {
    fn name(&self) -> &'static str {
        "stdout"
    }
    fn desc(&self) -> &'static str {
        "Stored stdout [[offset][:length]] (ro)"
    }
    fn read_only(&self) -> bool {
        true
    }
    fn indexable(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        ctx.runtime_readable(self.name())?;
        ctx.host.streams.read(&ctx.ct.stdout, None, None)
    }
    fn get_indexed(&self, ctx: &mut PropCtx, index: &str) -> SteinResult<String> {
        ctx.runtime_readable(self.name())?;
        let (offset, length) = parse_read_range(index)?;
        ctx.host.streams.read(&ctx.ct.stdout, offset, length)
    }
}

struct Stderr;
static STDERR: Stderr = Stderr;

impl Property for Stderr {
    fn name(&self) -> &'static str {
        "stderr"
    }
    fn desc(&self) -> &'static str {
        "Stored stderr [[offset][:length]] (ro)"
    }
    fn read_only(&self) -> bool {
        true
    }
    fn indexable(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        ctx.runtime_readable(self.name())?;
        ctx.host.streams.read(&ctx.ct.stderr, None, None)
    }
    fn get_indexed(&self, ctx: &mut PropCtx, index: &str) -> SteinResult<String> {
        ctx.runtime_readable(self.name())?;
        let (offset, length) = parse_read_range(index)?;
        ctx.host.streams.read(&ctx.ct.stderr, offset, length)
    }
}

pub(super) fn register(registry: &mut Registry) {
    registry.add(&STDIN_PATH);
    registry.add(&STDOUT_PATH);
    registry.add(&STDERR_PATH);
    registry.add(&STDOUT_LIMIT);
    registry.add(&STDOUT_OFFSET);
    registry.add(&STDERR_OFFSET);
    registry.add(&STDOUT);
    registry.add(&STDERR);
}
