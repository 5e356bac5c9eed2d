//! Per-run timing diagnostics.

use std::fmt::Write as _;
use std::time::Duration;

use finchat_core::AgentEvent;

/// One timed segment.
#[derive(Clone, Debug, PartialEq)]
pub struct TraceSegment {
    /// Segment name, e.g. `completion` or `tool:get_ticker_news`.
    pub name: String,
    /// Time spent.
    pub duration: Duration,
    /// Extra `key=value` pairs shown next to the bar.
    pub metadata: Vec<(String, String)>,
}

/// Collects timing segments for a single run and renders them as a bar
/// chart.
#[derive(Clone, Debug, Default)]
pub struct TraceRecorder {
    segments: Vec<TraceSegment>,
}

impl TraceRecorder {
    /// Creates an empty recorder.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a completed segment.
    pub fn add<S: Into<String>>(
        &mut self,
        name: S,
        duration: Duration,
        metadata: Vec<(String, String)>,
    ) {
        self.segments.push(TraceSegment {
            name: name.into(),
            duration,
            metadata,
        });
    }

    /// Records the timing carried by a conversation loop event.
    pub fn record_event(&mut self, event: &AgentEvent) {
        match event {
            AgentEvent::CompletionFinished {
                turn,
                elapsed,
                tool_calls,
            } => self.add(
                "completion",
                *elapsed,
                vec![
                    ("turn".to_owned(), turn.to_string()),
                    ("tool_calls".to_owned(), tool_calls.to_string()),
                ],
            ),
            AgentEvent::ToolFinished {
                turn,
                name,
                result,
                elapsed,
                ..
            } => {
                let status = match result.error() {
                    None => "ok".to_owned(),
                    Some(err) => err.kind().as_str().to_owned(),
                };
                self.add(
                    format!("tool:{name}"),
                    *elapsed,
                    vec![
                        ("turn".to_owned(), turn.to_string()),
                        ("status".to_owned(), status),
                    ],
                );
            }
        }
    }

    /// Returns the recorded segments in insertion order.
    #[inline]
    pub fn segments(&self) -> &[TraceSegment] {
        &self.segments
    }

    /// Sums durations by segment name, keeping first-seen order.
    pub fn aggregate(&self) -> Vec<TraceSegment> {
        let mut totals: Vec<TraceSegment> = vec![];
        for segment in &self.segments {
            match totals.iter_mut().find(|total| total.name == segment.name) {
                Some(total) => total.duration += segment.duration,
                None => totals.push(TraceSegment {
                    name: segment.name.clone(),
                    duration: segment.duration,
                    metadata: vec![],
                }),
            }
        }
        totals
    }

    /// Returns the total recorded duration.
    pub fn total(&self) -> Duration {
        self.segments.iter().map(|segment| segment.duration).sum()
    }

    /// Renders the report with bars `width` characters wide. With
    /// `collapse`, segments sharing a name are merged.
    pub fn report(&self, width: usize, collapse: bool) -> String {
        let aggregated;
        let segments = if collapse {
            aggregated = self.aggregate();
            &aggregated
        } else {
            &self.segments
        };
        if segments.is_empty() {
            return "Timing summary: no segments recorded.".to_owned();
        }

        let durations: Vec<f64> = segments
            .iter()
            .map(|segment| segment.duration.as_secs_f64())
            .collect();
        let total: f64 = durations.iter().sum();
        let bars = render_bars(&durations, width);

        let mut report = format!("Timing summary (total {total:.3}s):");
        let rows = segments.iter().zip(&durations).zip(bars);
        for ((segment, seconds), bar) in rows {
            let percent = if total > 0.0 {
                seconds / total * 100.0
            } else {
                0.0
            };
            let _ = write!(
                report,
                "\n{:<36} {seconds:>7.3}s  {bar} {percent:5.1}%",
                segment.name
            );
            if !segment.metadata.is_empty() {
                let meta: Vec<_> = segment
                    .metadata
                    .iter()
                    .map(|(key, value)| format!("{key}={value}"))
                    .collect();
                let _ = write!(report, "  {}", meta.join(", "));
            }
        }
        report
    }
}

/// Splits `width` cells among the values proportionally. Cells lost to
/// rounding go to the largest fractional remainders.
fn render_bars(values: &[f64], width: usize) -> Vec<String> {
    let total: f64 = values.iter().sum();
    if total <= 0.0 {
        return values
            .iter()
            .map(|_| format!("[{}]", "-".repeat(width)))
            .collect();
    }

    let mut cells = Vec::with_capacity(values.len());
    let mut remainders = Vec::with_capacity(values.len());
    for (idx, value) in values.iter().enumerate() {
        let scaled = value / total * width as f64;
        let whole = scaled.floor();
        cells.push(whole as usize);
        remainders.push((idx, scaled - whole));
    }

    let assigned: usize = cells.iter().sum();
    // Stable sort keeps earlier segments first on ties.
    remainders.sort_by(|a, b| b.1.total_cmp(&a.1));
    let spare = width.saturating_sub(assigned);
    for (idx, _) in remainders.into_iter().take(spare) {
        cells[idx] += 1;
    }

    cells
        .into_iter()
        .map(|filled| {
            let filled = filled.min(width);
            format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
        })
        .collect()
}
