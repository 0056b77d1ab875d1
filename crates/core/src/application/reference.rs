// Reference scenarios
// Phase sets for a full environment boot and for a custom image boot.
use std::path::PathBuf;

use crate::application::constants::*;
use crate::domain::error::Result;
use crate::domain::{
    Completion, Component, EnvironmentConfig, Phase, PollPolicy, Probe, Scenario, StartRequest,
};

/// Full boot: startup marker, the three component pid files, the three
/// platform listeners, workload exit 0, then teardown of every tracked pid.
pub fn reference_scenario(env: &EnvironmentConfig) -> Result<Scenario> {
    let mut builder = Scenario::builder("reference")
        .startup_marker(
            STARTUP_MARKER,
            PollPolicy::every_second(STARTUP_MARKER_TIMEOUT_SECS)?,
        );

    for phase in boot_phases(env)? {
        builder = builder.phase(phase);
    }

    builder
        .phase(Phase::new(
            PHASE_CONTROL_PLANE_READY,
            Probe::network_listening(env.control_plane_address()),
            PollPolicy::every_second(CONTROL_PLANE_TIMEOUT_SECS)?,
        ))
        .phase(Phase::new(
            PHASE_INGRESS_READY,
            Probe::network_listening(env.ingress_address()),
            PollPolicy::every_second(INGRESS_TIMEOUT_SECS)?,
        ))
        .completion(Completion::AwaitExit {
            expected_code: 0,
            timeout: WORKLOAD_COMPLETION_TIMEOUT,
        })
        .teardown_policy(PollPolicy::every_second(TEARDOWN_VERIFICATION_TIMEOUT_SECS)?)
        .build()
}

/// Boot from `image` up to the container runtime, then interrupt the start action
///
/// Pid files are still awaited but not tracked: the platform is never
/// deployed, so only the reaper vouches for teardown.
pub fn custom_image_scenario(env: &EnvironmentConfig, image: impl Into<PathBuf>) -> Result<Scenario> {
    let mut builder = Scenario::builder("custom-image")
        .start(StartRequest {
            image: Some(image.into()),
        })
        .startup_marker(
            STARTUP_MARKER,
            PollPolicy::every_second(STARTUP_MARKER_TIMEOUT_SECS)?,
        );

    for phase in boot_phases(env)? {
        builder = builder.phase(untracked(phase));
    }

    builder
        .completion(Completion::Terminate)
        .teardown_policy(PollPolicy::every_second(TEARDOWN_VERIFICATION_TIMEOUT_SECS)?)
        .build()
}

/// Phases shared by both scenarios, through container-runtime-ready
fn boot_phases(env: &EnvironmentConfig) -> Result<Vec<Phase>> {
    let file_policy = PollPolicy::every_second(FILE_PHASE_TIMEOUT_SECS)?;

    Ok(vec![
        Phase::new(
            PHASE_NETWORK_PROXY_CONFIG,
            Probe::file_exists(env.proxy_config_path()),
            file_policy,
        ),
        Phase::new(
            PHASE_NETWORK_VIRTUALIZATION_READY,
            Probe::file_exists(env.pid_file(Component::NetworkVirtualization)),
            file_policy,
        )
        .tracking_pid()?,
        Phase::new(
            PHASE_GUEST_INIT_READY,
            Probe::file_exists(env.pid_file(Component::GuestInit)),
            file_policy,
        )
        .tracking_pid()?,
        Phase::new(
            PHASE_HYPERVISOR_READY,
            Probe::file_exists(env.pid_file(Component::Hypervisor)),
            PollPolicy::every_second(HYPERVISOR_TIMEOUT_SECS)?,
        )
        .tracking_pid()?,
        Phase::new(
            PHASE_CONTAINER_RUNTIME_READY,
            Probe::network_listening(env.container_runtime_address()),
            PollPolicy::every_second(CONTAINER_RUNTIME_TIMEOUT_SECS)?,
        ),
    ])
}

fn untracked(phase: Phase) -> Phase {
    Phase::new(phase.name(), phase.probe().clone(), phase.policy())
}
