//! Tracks which environment the expander is currently inside

use std::sync::Arc;

use anyhow::Result;

use crate::macros::{Expansion, ExpansionContext, MacroDef, MacroTable};
use crate::plugin::{CodeContext, PluginCode};
use crate::state::StackError;

/// Names of the open environments, innermost last
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnvironmentStack(Vec<String>);

impl EnvironmentStack {
    pub fn push(&mut self, name: impl Into<String>) {
        self.0.push(name.into());
    }

    pub fn pop(&mut self) -> Result<String, StackError> {
        self.0.pop().ok_or(StackError::Underflow("environment"))
    }

    pub fn current(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

fn push_envir(ctx: &mut dyn ExpansionContext, args: &[String]) -> Result<Expansion> {
    let name = ctx.expand(&args[0])?.trim().to_string();
    ctx.state().get_mut::<EnvironmentStack>().push(name);
    Ok(Expansion::Empty)
}

fn pop_envir(ctx: &mut dyn ExpansionContext, _: &[String]) -> Result<Expansion> {
    ctx.state().get_mut::<EnvironmentStack>().pop()?;
    Ok(Expansion::Empty)
}

fn current_envir(ctx: &mut dyn ExpansionContext, _: &[String]) -> Result<Expansion> {
    let current = ctx
        .state()
        .get::<EnvironmentStack>()
        .and_then(EnvironmentStack::current)
        .unwrap_or_default()
        .to_string();
    Ok(Expansion::text(current))
}

pub struct EnvironmentsCode;

impl PluginCode for EnvironmentsCode {
    fn macros(&mut self, _ctx: &CodeContext<'_>) -> Result<MacroTable> {
        let mut table = MacroTable::new();
        table.insert("@pushenvir".into(), Arc::new(MacroDef::native(1, push_envir)));
        table.insert("@popenvir".into(), Arc::new(MacroDef::native(0, pop_envir)));
        table.insert("@currenvir".into(), Arc::new(MacroDef::native(0, current_envir)));
        Ok(table)
    }
}
