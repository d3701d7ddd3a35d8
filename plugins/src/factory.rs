use std::sync::Arc;

use tajaa_core::config::AppConfig;
use tajaa_core::decoder::DecoderRegistry;
use tajaa_core::error::SupervisorError;
use tajaa_core::runner::CommandRunner;
use tajaa_core::supervisor::TaskSupervisor;
use tajaa_core::OutputObserver;

use crate::decoder::{GobusterDecoder, MasscanDecoder, NiktoDecoder, NmapDecoder, WhatwebDecoder};
use crate::observer::ConsoleObserver;

/// Registry with every built-in decoder.
pub fn build_decoders() -> DecoderRegistry {
    let mut reg = DecoderRegistry::new();
    reg.register(Arc::new(NmapDecoder))
        .register(Arc::new(MasscanDecoder))
        .register(Arc::new(NiktoDecoder))
        .register(Arc::new(GobusterDecoder))
        .register(Arc::new(WhatwebDecoder));
    tracing::debug!(decoders = reg.len(), "decoder registry built");
    reg
}

pub fn build_console_observer(quiet: bool, tag_tasks: bool) -> Option<Arc<dyn OutputObserver>> {
    if quiet {
        return None;
    }
    let observer = if tag_tasks {
        ConsoleObserver::new().with_task_prefix()
    } else {
        ConsoleObserver::new()
    };
    Some(Arc::new(observer))
}

pub fn build_runner(cfg: &AppConfig) -> CommandRunner {
    CommandRunner::new(cfg.runner.clone())
}

/// Must run inside a tokio runtime.
pub fn build_supervisor(cfg: &AppConfig) -> Result<TaskSupervisor, SupervisorError> {
    TaskSupervisor::new(cfg.supervisor.clone())
}
