//! Fixed-tick state machine that ties the pose source to the scene.

use anyhow::{bail, Result};
use arpose_config::AppConfig;
use arpose_net::{LinkState, PoseSource};
use arpose_scene::space::{render_to_physics_quat, render_to_physics_vec};
use arpose_scene::{align_plane, PhysicsWorld, PlaneAlignment, SceneHooks, Stage};
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneState {
    /// First tick not yet run.
    NotStarted,
    /// One tick in; the next one takes baselines and connects.
    WarmingUp,
    /// Streaming, waiting for the first plane.
    AwaitingPlane,
    /// Scene started; physics and scene logic advance every tick.
    Running,
}

/// What happened during one tick.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub camera_updated: bool,
    pub plane_aligned: bool,
    /// The scene was started this tick.
    pub started: bool,
    /// Seconds since the previous tick. Zero before streaming begins.
    pub dt: f32,
}

pub struct Driver<S: PoseSource> {
    state: SceneState,
    source: S,
    stage: Stage,
    physics: PhysicsWorld,
    hooks: Box<dyn SceneHooks>,
    gravity: f32,
    alignment_enabled: bool,
    continuous: bool,
    last_alignment: Option<PlaneAlignment>,
    started_at: Option<Instant>,
    last_tick: Option<Instant>,
    ticks: u64,
    heartbeat_ticks: u64,
    camera_updates: u64,
    alignments: u64,
}

impl<S: PoseSource> Driver<S> {
    pub fn new(config: &AppConfig, source: S, hooks: Box<dyn SceneHooks>) -> Self {
        let stage = Stage::new(config);
        let physics = PhysicsWorld::new(
            render_to_physics_vec(stage.ground.size / 2.0),
            config.align.gravity,
        );

        Self {
            state: SceneState::NotStarted,
            source,
            stage,
            physics,
            hooks,
            gravity: config.align.gravity,
            alignment_enabled: true,
            continuous: config.align.continuous,
            last_alignment: None,
            started_at: None,
            last_tick: None,
            ticks: 0,
            heartbeat_ticks: config.update.heartbeat_ticks,
            camera_updates: 0,
            alignments: 0,
        }
    }

    pub fn tick(&mut self) -> Result<TickReport> {
        self.tick_at(Instant::now())
    }

    /// Run one tick as if the clock read `now`.
    pub fn tick_at(&mut self, now: Instant) -> Result<TickReport> {
        let mut report = TickReport::default();

        match self.state {
            SceneState::NotStarted => self.state = SceneState::WarmingUp,
            SceneState::WarmingUp => {
                self.started_at = Some(now);
                self.last_tick = Some(now);
                self.source.connect()?;
                info!("Streaming started, waiting for a plane");
                self.state = SceneState::AwaitingPlane;
            }
            SceneState::AwaitingPlane | SceneState::Running => {
                self.stream_tick(now, &mut report)?;
            }
        }

        self.ticks += 1;
        if self.heartbeat_ticks > 0 && self.ticks % self.heartbeat_ticks == 0 {
            debug!(
                ticks = self.ticks,
                state = ?self.state,
                uptime = ?self.started_at.map(|t| now.saturating_duration_since(t)),
                camera_updates = self.camera_updates,
                alignments = self.alignments,
                "Heartbeat"
            );
        }

        Ok(report)
    }

    fn stream_tick(&mut self, now: Instant, report: &mut TickReport) -> Result<()> {
        let dt = self
            .last_tick
            .map(|last| now.saturating_duration_since(last).as_secs_f32())
            .unwrap_or(0.0);
        self.last_tick = Some(now);
        report.dt = dt;

        if let LinkState::Failed(reason) = self.source.link_state() {
            bail!("Vision server link failed: {reason}");
        }

        if let Some(reading) = self.source.try_camera() {
            match self.stage.apply_camera(reading) {
                Ok(()) => {
                    self.camera_updates += 1;
                    report.camera_updated = true;
                }
                Err(e) => warn!(%e, "Skipping camera update"),
            }
        }

        if self.alignment_enabled {
            if let Some(reading) = self.source.try_plane() {
                match align_plane(&reading, self.gravity) {
                    Ok(alignment) => self.apply_alignment(alignment, report),
                    Err(e) => warn!(?e, ?reading, "Skipping plane update"),
                }
            }
        }

        if self.state == SceneState::Running {
            self.physics.step(dt);
            self.hooks.update(dt, &self.stage, &self.physics);
        }

        Ok(())
    }

    fn apply_alignment(&mut self, alignment: PlaneAlignment, report: &mut TickReport) {
        self.stage.apply_alignment(&alignment);
        self.physics.set_ground_pose(
            render_to_physics_vec(alignment.position),
            render_to_physics_quat(alignment.rotation),
        );
        self.physics.set_gravity(alignment.gravity);
        if alignment.used_fallback {
            debug!(normal = ?alignment.normal, "Plane basis built from fallback axis");
        }
        self.last_alignment = Some(alignment);
        self.alignments += 1;
        report.plane_aligned = true;

        if self.state == SceneState::AwaitingPlane {
            self.hooks.init(&self.stage, &mut self.physics);
            self.hooks.on_start();
            self.state = SceneState::Running;
            report.started = true;
            info!(
                normal = ?alignment.normal,
                position = ?alignment.position,
                "First plane aligned, scene started"
            );

            if !self.continuous {
                self.alignment_enabled = false;
                self.source.discard_plane();
                info!("Plane frozen after first alignment");
            }
        }
    }

    pub fn state(&self) -> SceneState {
        self.state
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn physics(&self) -> &PhysicsWorld {
        &self.physics
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn last_alignment(&self) -> Option<&PlaneAlignment> {
        self.last_alignment.as_ref()
    }

    pub fn alignment_enabled(&self) -> bool {
        self.alignment_enabled
    }

    /// Stop (or resume) applying plane updates. Camera updates are unaffected.
    ///
    /// Planes detected while disabled are never applied.
    pub fn set_alignment_enabled(&mut self, enabled: bool) {
        if self.alignment_enabled == enabled {
            return;
        }
        info!(enabled, "Plane alignment toggled");
        self.alignment_enabled = enabled;
        if !enabled {
            self.source.discard_plane();
        }
    }
}
