//! Counters and expansion control macros

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::macros::{Expansion, ExpansionContext, MacroDef, MacroTable};

type Control = fn(&mut dyn ExpansionContext, &[String]) -> Result<Expansion>;

/// `\foo` or `{\foo}` → `foo`
fn command_name(arg: &str) -> Option<&str> {
    let name = arg
        .trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .trim()
        .strip_prefix('\\')?;

    (!name.is_empty()).then_some(name)
}

fn expand_trimmed(ctx: &mut dyn ExpansionContext, arg: &str) -> Result<String> {
    Ok(ctx.expand(arg)?.trim().to_string())
}

fn expand_number(ctx: &mut dyn ExpansionContext, arg: &str) -> Result<i64> {
    let text = expand_trimmed(ctx, arg)?;
    text.parse()
        .with_context(|| format!("Expected a number, found '{}'", text))
}

/// Defines `\the<counter>` as `value`
fn set_counter(ctx: &mut dyn ExpansionContext, counter: &str, value: i64) {
    ctx.macros_mut().insert(
        format!("the{counter}"),
        Arc::new(MacroDef::template(0, value.to_string())),
    );
}

fn counter_value(ctx: &mut dyn ExpansionContext, counter: &str) -> Result<i64> {
    let name = format!("the{counter}");
    let Some(def) = ctx.macros().get(&name).cloned() else {
        bail!("Counter '{}' is not defined", counter);
    };

    match def.template_body() {
        Some(body) => body
            .trim()
            .parse()
            .with_context(|| format!("Counter '{}' holds '{}'", counter, body)),
        None => expand_number(ctx, &format!(r"\{name}")),
    }
}

fn newcounter(ctx: &mut dyn ExpansionContext, args: &[String]) -> Result<Expansion> {
    let counter = expand_trimmed(ctx, &args[0])?;
    set_counter(ctx, &counter, 0);
    Ok(Expansion::Empty)
}

fn setcounter(ctx: &mut dyn ExpansionContext, args: &[String]) -> Result<Expansion> {
    let counter = expand_trimmed(ctx, &args[0])?;
    let value = expand_number(ctx, &args[1])?;
    set_counter(ctx, &counter, value);
    Ok(Expansion::Empty)
}

fn addtocounter(ctx: &mut dyn ExpansionContext, args: &[String]) -> Result<Expansion> {
    let counter = expand_trimmed(ctx, &args[0])?;
    let delta = expand_number(ctx, &args[1])?;
    let value = counter_value(ctx, &counter)?;
    set_counter(ctx, &counter, value + delta);
    Ok(Expansion::Empty)
}

fn stepcounter(ctx: &mut dyn ExpansionContext, args: &[String]) -> Result<Expansion> {
    let counter = expand_trimmed(ctx, &args[0])?;
    let value = counter_value(ctx, &counter)?;
    set_counter(ctx, &counter, value + 1);
    Ok(Expansion::Empty)
}

/// Picks a branch; the branch is scanned again by the expander
fn branch(condition: bool, args: &[String], then_at: usize) -> Expansion {
    let index = if condition { then_at } else { then_at + 1 };
    Expansion::text(args[index].clone())
}

fn ifempty(ctx: &mut dyn ExpansionContext, args: &[String]) -> Result<Expansion> {
    let test = expand_trimmed(ctx, &args[0])?;
    Ok(branch(test.is_empty(), args, 1))
}

fn ifdefined(ctx: &mut dyn ExpansionContext, args: &[String]) -> Result<Expansion> {
    let defined = command_name(&args[0]).is_some_and(|name| ctx.macros().contains_key(name));
    Ok(branch(defined, args, 1))
}

fn ifequal(ctx: &mut dyn ExpansionContext, args: &[String]) -> Result<Expansion> {
    let left = expand_trimmed(ctx, &args[0])?;
    let right = expand_trimmed(ctx, &args[1])?;
    Ok(branch(left == right, args, 2))
}

fn csname(ctx: &mut dyn ExpansionContext, args: &[String]) -> Result<Expansion> {
    let name = expand_trimmed(ctx, &args[0])?;
    Ok(Expansion::text(format!(r"\{name}")))
}

fn ifcsname(ctx: &mut dyn ExpansionContext, args: &[String]) -> Result<Expansion> {
    let name = expand_trimmed(ctx, &args[0])?;
    let defined = ctx.macros().contains_key(&name);
    Ok(branch(defined, args, 1))
}

fn noexpand(_: &mut dyn ExpansionContext, args: &[String]) -> Result<Expansion> {
    Ok(Expansion::verbatim(args[0].clone()))
}

fn let_(ctx: &mut dyn ExpansionContext, args: &[String]) -> Result<Expansion> {
    let (Some(new), Some(old)) = (command_name(&args[0]), command_name(&args[1])) else {
        bail!(r"\let expects two commands, found '{}' and '{}'", args[0], args[1]);
    };

    let Some(def) = ctx.macros().get(old).cloned() else {
        bail!(r"\let: \{} is not defined", old);
    };

    ctx.macros_mut().insert(new.to_string(), def);
    Ok(Expansion::Empty)
}

fn edef(ctx: &mut dyn ExpansionContext, args: &[String]) -> Result<Expansion> {
    let Some(name) = command_name(&args[0]) else {
        bail!(r"\edef expects a command, found '{}'", args[0]);
    };
    let name = name.to_string();

    let body = ctx.expand(&args[1])?;
    ctx.macros_mut()
        .insert(name, Arc::new(MacroDef::template(0, body)));
    Ok(Expansion::Empty)
}

fn breakpoint(_: &mut dyn ExpansionContext, _: &[String]) -> Result<Expansion> {
    info!("breakpoint");
    Ok(Expansion::Empty)
}

/// The control macros of the core plugin
pub fn macros() -> MacroTable {
    let natives: [(&str, usize, Control); 13] = [
        ("newcounter", 1, newcounter),
        ("setcounter", 2, setcounter),
        ("addtocounter", 2, addtocounter),
        ("stepcounter", 1, stepcounter),
        ("ifempty", 3, ifempty),
        ("ifdefined", 3, ifdefined),
        ("ifequal", 4, ifequal),
        ("csname", 1, csname),
        ("ifcsname", 3, ifcsname),
        ("noexpand", 1, noexpand),
        ("let", 2, let_),
        ("edef", 2, edef),
        ("breakpoint", 0, breakpoint),
    ];

    natives
        .into_iter()
        .map(|(name, arity, f)| (name.to_string(), Arc::new(MacroDef::native(arity, f))))
        .collect()
}
