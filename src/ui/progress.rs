//! Terminal dashboard showing the progress of concurrent runs.

use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::Span,
    widgets::{Block, Borders, Gauge, Paragraph},
    Frame,
};

use crate::learner::active::RunStatus;

/// Messages sent from worker threads to the dashboard.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    Started {
        run: usize,
    },
    Iteration {
        run: usize,
        iteration: usize,
        mean_entropy: f64,
        mean_kl: f64,
    },
    Finished {
        run: usize,
        status: RunStatus,
        iterations: usize,
    },
    Failed {
        run: usize,
        message: String,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum RunPhase {
    Pending,
    Running,
    Done(RunStatus),
    Failed(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunProgress {
    pub iteration: usize,
    pub mean_entropy: f64,
    pub mean_kl: f64,
    pub phase: RunPhase,
}

impl Default for RunProgress {
    fn default() -> Self {
        Self {
            iteration: 0,
            mean_entropy: f64::NAN,
            mean_kl: f64::NAN,
            phase: RunPhase::Pending,
        }
    }
}

/// Snapshot of everything the dashboard draws.
#[derive(Clone, Debug)]
pub struct DashboardState {
    pub title: String,
    pub queries: usize,
    pub runs: Vec<RunProgress>,
}

impl DashboardState {
    #[must_use]
    pub fn new(title: impl Into<String>, runs: usize, queries: usize) -> Self {
        Self {
            title: title.into(),
            queries,
            runs: vec![RunProgress::default(); runs],
        }
    }

    pub fn apply(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { run } => {
                if let Some(p) = self.runs.get_mut(run) {
                    p.phase = RunPhase::Running;
                }
            }
            ProgressEvent::Iteration {
                run,
                iteration,
                mean_entropy,
                mean_kl,
            } => {
                if let Some(p) = self.runs.get_mut(run) {
                    p.iteration = iteration;
                    p.mean_entropy = mean_entropy;
                    p.mean_kl = mean_kl;
                    p.phase = RunPhase::Running;
                }
            }
            ProgressEvent::Finished {
                run,
                status,
                iterations,
            } => {
                if let Some(p) = self.runs.get_mut(run) {
                    p.iteration = iterations;
                    p.phase = RunPhase::Done(status);
                }
            }
            ProgressEvent::Failed { run, message } => {
                if let Some(p) = self.runs.get_mut(run) {
                    p.phase = RunPhase::Failed(message);
                }
            }
        }
    }

    /// True once no run is pending or running.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.runs
            .iter()
            .all(|p| matches!(p.phase, RunPhase::Done(_) | RunPhase::Failed(_)))
    }

    fn ratio(&self, progress: &RunProgress) -> f64 {
        match progress.phase {
            RunPhase::Done(_) => 1.0,
            _ if self.queries == 0 => 0.0,
            _ => (progress.iteration as f64 / self.queries as f64).clamp(0.0, 1.0),
        }
    }
}

fn label(index: usize, progress: &RunProgress, queries: usize) -> String {
    match &progress.phase {
        RunPhase::Pending => format!("run {index}: pending"),
        RunPhase::Running => format!(
            "run {index}: {}/{queries}  H {:.3}  KL {:.3}",
            progress.iteration, progress.mean_entropy, progress.mean_kl
        ),
        RunPhase::Done(RunStatus::BudgetReached) => {
            format!("run {index}: done ({} iterations)", progress.iteration)
        }
        RunPhase::Done(RunStatus::Exhausted) => {
            format!("run {index}: exhausted after {}", progress.iteration)
        }
        RunPhase::Failed(message) => format!("run {index}: failed: {message}"),
    }
}

pub fn draw_dashboard(f: &mut Frame, state: &DashboardState) {
    let mut constraints = vec![Constraint::Length(1)];
    constraints.extend(state.runs.iter().map(|_| Constraint::Length(3)));
    constraints.push(Constraint::Min(0));
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(f.area());

    let header = Paragraph::new(Span::styled(
        format!("{}  (q to quit)", state.title),
        Style::default().add_modifier(Modifier::REVERSED),
    ));
    f.render_widget(header, chunks[0]);

    for (index, progress) in state.runs.iter().enumerate() {
        let Some(&area) = chunks.get(index + 1) else {
            break;
        };
        let color = match progress.phase {
            RunPhase::Pending => Color::DarkGray,
            RunPhase::Running => Color::Cyan,
            RunPhase::Done(_) => Color::Green,
            RunPhase::Failed(_) => Color::Red,
        };
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL))
            .gauge_style(Style::default().fg(color).bg(Color::Black))
            .ratio(state.ratio(progress))
            .label(label(index, progress, state.queries));
        f.render_widget(gauge, area);
    }
}
