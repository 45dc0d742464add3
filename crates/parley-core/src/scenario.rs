//! Scenario compilation.
//!
//! Scripts are turned into per-channel step arenas once, at load time. Step
//! ids are resolved to indices, predicates and rubric patterns are compiled,
//! and authoring mistakes are reported before any session uses the scenario.

use crate::grader::CompiledTask;
use crate::matcher::Matcher;
use crate::{ParleyError, Result};
use parley_types::{Branch, ConversationFlow, Scenario, Step, Task, Utterance, WaitFor};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// How authoring mistakes are handled at load time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strictness {
    /// Reject the scenario.
    #[default]
    Strict,
    /// Log and degrade: bad patterns never match, dangling ids are terminal.
    Lenient,
}

/// Position of a channel's conversation within its script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowPointer {
    At(usize),
    /// Past the end of the script, or a `next` that did not resolve.
    Terminal,
}

#[derive(Debug, Clone)]
pub struct CompiledBranch {
    pub matcher: Matcher,
    pub say: Vec<Utterance>,
    /// `None` keeps the pointer where it is.
    pub next: Option<FlowPointer>,
}

#[derive(Debug, Clone)]
pub struct CompiledStep {
    pub id: String,
    pub say: Vec<Utterance>,
    /// Event key -> branches in declared order. Empty lists are dropped.
    pub on: HashMap<String, Vec<CompiledBranch>>,
    pub wait_for: Option<WaitFor>,
    /// Legacy advance target; `Terminal` when `next` is absent.
    pub next: FlowPointer,
    pub conversation_flow: Option<ConversationFlow>,
}

impl CompiledStep {
    pub fn is_client_paced(&self) -> bool {
        self.conversation_flow
            .as_ref()
            .is_some_and(ConversationFlow::is_client_paced)
    }

    pub fn branches(&self, key: &str) -> Option<&[CompiledBranch]> {
        self.on.get(key).map(Vec::as_slice)
    }
}

/// Step arena for one channel.
#[derive(Debug, Clone, Default)]
pub struct ChannelScript {
    steps: Vec<CompiledStep>,
    by_id: HashMap<String, usize>,
}

impl ChannelScript {
    pub fn step(&self, pointer: FlowPointer) -> Option<&CompiledStep> {
        match pointer {
            FlowPointer::At(index) => self.steps.get(index),
            FlowPointer::Terminal => None,
        }
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    pub fn first(&self) -> Option<FlowPointer> {
        (!self.steps.is_empty()).then_some(FlowPointer::At(0))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Only a step's own lines count. Tasks handed out inside a branch do
    /// not route submissions back to this channel.
    fn references_task(&self, task_id: &str) -> bool {
        self.steps
            .iter()
            .flat_map(|step| &step.say)
            .any(|u| u.task_id.as_deref() == Some(task_id))
    }
}

/// A validated, ready-to-run scenario.
#[derive(Debug, Clone)]
pub struct CompiledScenario {
    source: Scenario,
    scripts: HashMap<String, ChannelScript>,
    tasks: HashMap<String, CompiledTask>,
    task_channels: HashMap<String, Vec<String>>,
}

impl CompiledScenario {
    pub fn compile(source: Scenario, strictness: Strictness) -> Result<Self> {
        let mut names = HashSet::new();
        for channel in &source.channels {
            if !names.insert(channel.name.as_str()) {
                return Err(ParleyError::InvalidScenario(format!(
                    "duplicate channel name '{}'",
                    channel.name
                )));
            }
        }
        for name in source.script.keys() {
            if !names.contains(name.as_str()) {
                warn!(target: "parley::scenario", "Script for undeclared channel '{}' will never run", name);
            }
        }

        let mut tasks = HashMap::new();
        for task in &source.tasks {
            if tasks.contains_key(&task.id) {
                reject_or_warn(strictness, format!("duplicate task id '{}'", task.id))?;
                continue;
            }
            tasks.insert(task.id.clone(), compile_task(task.clone(), strictness)?);
        }

        for channel in &source.channels {
            for task_id in channel.seed.iter().filter_map(|u| u.task_id.as_deref()) {
                if !tasks.contains_key(task_id) {
                    reject_or_warn(
                        strictness,
                        format!("seed of channel '{}' assigns unknown task '{}'", channel.name, task_id),
                    )?;
                }
            }
        }

        let mut scripts = HashMap::new();
        for (channel, steps) in &source.script {
            let script = compile_script(channel, steps, &tasks, strictness)?;
            scripts.insert(channel.clone(), script);
        }

        let mut task_channels: HashMap<String, Vec<String>> = HashMap::new();
        for task_id in tasks.keys() {
            let channels: Vec<String> = source
                .channels
                .iter()
                .filter(|c| {
                    scripts
                        .get(&c.name)
                        .is_some_and(|s| s.references_task(task_id))
                })
                .map(|c| c.name.clone())
                .collect();
            task_channels.insert(task_id.clone(), channels);
        }

        Ok(Self {
            source,
            scripts,
            tasks,
            task_channels,
        })
    }

    pub fn source(&self) -> &Scenario {
        &self.source
    }

    pub fn script(&self, channel: &str) -> Option<&ChannelScript> {
        self.scripts.get(channel).filter(|s| !s.is_empty())
    }

    pub fn task(&self, task_id: &str) -> Option<&CompiledTask> {
        self.tasks.get(task_id)
    }

    /// Channels, in declaration order, whose script steps assign the task.
    pub fn channels_for_task(&self, task_id: &str) -> &[String] {
        self.task_channels
            .get(task_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Conversation flow of a channel's first step.
    pub fn initial_flow(&self, channel: &str) -> Option<ConversationFlow> {
        self.source
            .script
            .get(channel)
            .and_then(|steps| steps.first())
            .and_then(|step| step.conversation_flow.clone())
    }
}

fn reject_or_warn(strictness: Strictness, message: String) -> Result<()> {
    match strictness {
        Strictness::Strict => Err(ParleyError::InvalidScenario(message)),
        Strictness::Lenient => {
            warn!(target: "parley::scenario", "{}", message);
            Ok(())
        }
    }
}

fn compile_task(task: Task, strictness: Strictness) -> Result<CompiledTask> {
    match strictness {
        Strictness::Strict => CompiledTask::compile(task).map_err(|e| {
            ParleyError::InvalidScenario(format!("rubric: {}", e))
        }),
        Strictness::Lenient => Ok(CompiledTask::compile_lenient(task)),
    }
}

fn compile_script(
    channel: &str,
    steps: &[Step],
    tasks: &HashMap<String, CompiledTask>,
    strictness: Strictness,
) -> Result<ChannelScript> {
    let mut by_id = HashMap::new();
    for (index, step) in steps.iter().enumerate() {
        if by_id.insert(step.id.clone(), index).is_some() {
            return Err(ParleyError::InvalidScenario(format!(
                "duplicate step id '{}' in channel '{}'",
                step.id, channel
            )));
        }
    }

    let resolve = |from: &str, target: &str| -> Result<FlowPointer> {
        match by_id.get(target) {
            Some(&index) => Ok(FlowPointer::At(index)),
            None => {
                reject_or_warn(
                    strictness,
                    format!(
                        "step '{}' in channel '{}' points to unknown step '{}'",
                        from, channel, target
                    ),
                )?;
                Ok(FlowPointer::Terminal)
            }
        }
    };

    let check_tasks = |from: &str, say: &[Utterance]| -> Result<()> {
        for task_id in say.iter().filter_map(|u| u.task_id.as_deref()) {
            if !tasks.contains_key(task_id) {
                reject_or_warn(
                    strictness,
                    format!(
                        "step '{}' in channel '{}' assigns unknown task '{}'",
                        from, channel, task_id
                    ),
                )?;
            }
        }
        Ok(())
    };

    let mut compiled = Vec::with_capacity(steps.len());
    for step in steps {
        check_tasks(&step.id, &step.say)?;

        let mut on = HashMap::new();
        for (key, branches) in step.on.iter().flatten() {
            if branches.is_empty() {
                continue;
            }
            let mut list = Vec::with_capacity(branches.len());
            for branch in branches {
                check_tasks(&step.id, &branch.say)?;
                list.push(compile_branch(branch, &step.id, strictness, &resolve)?);
            }
            on.insert(key.clone(), list);
        }

        let next = match &step.next {
            Some(target) => resolve(&step.id, target)?,
            None => FlowPointer::Terminal,
        };

        compiled.push(CompiledStep {
            id: step.id.clone(),
            say: step.say.clone(),
            on,
            wait_for: step.wait_for.clone(),
            next,
            conversation_flow: step.conversation_flow.clone(),
        });
    }

    Ok(ChannelScript {
        steps: compiled,
        by_id,
    })
}

fn compile_branch(
    branch: &Branch,
    step_id: &str,
    strictness: Strictness,
    resolve: &impl Fn(&str, &str) -> Result<FlowPointer>,
) -> Result<CompiledBranch> {
    let matcher = match strictness {
        Strictness::Strict => Matcher::compile(branch.when.as_ref())
            .map_err(|e| ParleyError::InvalidScenario(format!("step '{}': {}", step_id, e)))?,
        Strictness::Lenient => Matcher::compile_lenient(branch.when.as_ref()),
    };
    let next = match &branch.next {
        Some(target) => Some(resolve(step_id, target)?),
        None => None,
    };
    Ok(CompiledBranch {
        matcher,
        say: branch.say.clone(),
        next,
    })
}
