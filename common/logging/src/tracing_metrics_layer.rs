//! Exposes [`MetricsLayer`]: A tracing layer that registers metrics of logging events.

use crate::{CRITS_TOTAL, ERRORS_TOTAL, INFOS_TOTAL, WARNS_TOTAL};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

pub struct MetricsLayer;

impl<S: Subscriber> Layer<S> for MetricsLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if !meta.is_event() {
            return;
        }
        match *meta.level() {
            Level::INFO => metrics::inc_counter(&INFOS_TOTAL),
            Level::WARN => metrics::inc_counter(&WARNS_TOTAL),
            Level::ERROR => {
                metrics::inc_counter(&ERRORS_TOTAL);

                let mut visitor = CritVisitor::default();
                event.record(&mut visitor);
                if visitor.is_crit {
                    metrics::inc_counter(&CRITS_TOTAL);
                }
            }
            _ => {}
        }
    }
}

#[derive(Default)]
struct CritVisitor {
    is_crit: bool,
}

impl Visit for CritVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "error_type" && value == "crit" {
            self.is_crit = true;
        }
    }

    fn record_debug(&mut self, _field: &Field, _value: &dyn std::fmt::Debug) {}
}
