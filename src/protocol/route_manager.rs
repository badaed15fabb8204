use super::messages::{AdvertisedRoute, UpdateMessage};
use super::routing_table::{INFINITY_METRIC, Metric, RouteEntry, TimerTransition};
use crate::error::{RipError, RipResult};
use crate::events::{EventPayload, EventSink, InvalidationReason, LogEntry};
use crate::network::Topology;
use crate::router::Router;
use chrono::{DateTime, Utc};
use log::debug;

/// Per-message tally of what the receiver did with each advertised route.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub installed: usize,
    pub changed: usize,
    pub refreshed: usize,
    pub invalidated: usize,
    pub ignored: usize,
}

impl UpdateOutcome {
    pub fn table_changed(&self) -> bool {
        self.installed + self.changed + self.invalidated > 0
    }
}

enum Decision {
    Install(Metric),
    Update(Metric),
    Withdraw,
    Ignore(&'static str),
}

/// Builds the update `source` would send to `destination`.
///
/// Scheduled updates carry only Valid routes; triggered ones also carry
/// invalid routes so withdrawals spread faster. A route whose next hop is
/// the destination is suppressed by split horizon, or advertised at
/// infinity when poison reverse is on.
pub fn create_update_message(
    topology: &Topology,
    source: &str,
    destination: &str,
    triggered: bool,
    now: DateTime<Utc>,
) -> Option<UpdateMessage> {
    let router = topology.router(source)?;
    let mut routes = Vec::new();

    for entry in router.routing_table.iter() {
        if !entry.is_valid() && !triggered {
            continue;
        }

        let mut advertised = AdvertisedRoute::from_entry(entry);

        if router.config.split_horizon && entry.next_hop.as_deref() == Some(destination) {
            if router.config.poison_reverse {
                advertised.metric = INFINITY_METRIC;
                routes.push(advertised);
            }
            continue;
        }

        routes.push(advertised);
    }

    Some(UpdateMessage {
        source: source.to_string(),
        destination: destination.to_string(),
        timestamp: now,
        triggered,
        routes,
    })
}

/// Bellman-Ford relaxation of one received update against the receiver's
/// table. Routes the message does not mention are left alone.
pub fn process_received_update(
    topology: &mut Topology,
    message: &UpdateMessage,
    now: DateTime<Utc>,
    sink: &dyn EventSink,
) -> RipResult<UpdateOutcome> {
    let router = topology
        .router_mut(&message.destination)
        .ok_or_else(|| RipError::UnknownRouter(message.destination.clone()))?;
    let source = message.source.as_str();

    sink.record(LogEntry::new(
        now,
        &router.id,
        format!("Received update from {} with {} routes", source, message.routes.len()),
        EventPayload::UpdateReceived {
            source: source.to_string(),
            route_count: message.routes.len(),
        },
    ));

    let mut outcome = UpdateOutcome::default();

    for advertised in &message.routes {
        let network = advertised.destination.as_str();

        match evaluate(router, advertised, source, now) {
            Decision::Ignore(reason) => {
                debug!("{}: ignoring {} metric {} from {} ({})", router.id, network, advertised.metric, source, reason);
                outcome.ignored += 1;
            }
            Decision::Install(metric) => {
                router
                    .routing_table
                    .insert(RouteEntry::learned(network.to_string(), metric, source, now));
                outcome.installed += 1;
                sink.record(LogEntry::new(
                    now,
                    &router.id,
                    format!("Installed new route to {}: metric {} via {}", network, metric, source),
                    EventPayload::RouteInstalled {
                        network: network.to_string(),
                        metric,
                        next_hop: source.to_string(),
                    },
                ));
            }
            Decision::Update(metric) => {
                let Some(entry) = router.routing_table.get_mut(network) else {
                    continue;
                };
                let old_metric = entry.metric;
                let same_path = old_metric == metric && entry.next_hop.as_deref() == Some(source);
                entry.refresh(metric, source, now);

                if same_path {
                    outcome.refreshed += 1;
                    continue;
                }

                outcome.changed += 1;
                let improved = metric < old_metric;
                sink.record(LogEntry::new(
                    now,
                    &router.id,
                    format!(
                        "{} route to {}: metric {}->{} via {}",
                        if improved { "Better" } else { "Updated" },
                        network,
                        old_metric,
                        metric,
                        source
                    ),
                    EventPayload::RouteChanged {
                        network: network.to_string(),
                        old_metric,
                        new_metric: metric,
                        next_hop: source.to_string(),
                        improved,
                    },
                ));
            }
            Decision::Withdraw => {
                if let Some(transition) = router.routing_table.withdraw(network, &router.config, now) {
                    outcome.invalidated += 1;
                    let (text, payload) = describe_transition(&transition, InvalidationReason::PoisonReceived);
                    sink.record(LogEntry::new(now, &router.id, text, payload));
                }
            }
        }
    }

    Ok(outcome)
}

fn evaluate(router: &Router, advertised: &AdvertisedRoute, source: &str, now: DateTime<Utc>) -> Decision {
    let network = advertised.destination.as_str();
    let existing = router.routing_table.get(network);

    if advertised.metric >= INFINITY_METRIC {
        let withdraws_current_path = existing
            .is_some_and(|entry| !entry.is_direct() && entry.is_valid() && entry.is_learned_from(source));
        if router.config.poison_invalidates && withdraws_current_path {
            return Decision::Withdraw;
        }
        return Decision::Ignore("unreachable");
    }

    if router.is_direct_network(network) {
        return Decision::Ignore("directly attached");
    }

    let candidate = advertised.metric + 1;
    if candidate >= INFINITY_METRIC {
        return Decision::Ignore("beyond maximum hop count");
    }

    let Some(existing) = existing else {
        return Decision::Install(candidate);
    };

    if existing.in_hold_down(&router.config, now) && !existing.is_learned_from(source) {
        let held = existing.hold_down_metric.unwrap_or(INFINITY_METRIC);
        if candidate > held {
            return Decision::Ignore("hold-down");
        }
    }

    if candidate < existing.metric || existing.is_learned_from(source) {
        Decision::Update(candidate)
    } else {
        Decision::Ignore("no better than current route")
    }
}

/// Human message and payload for a lifecycle transition.
pub fn describe_transition(transition: &TimerTransition, reason: InvalidationReason) -> (String, EventPayload) {
    match transition {
        TimerTransition::Invalidated { network, previous_metric } => (
            format!("Route to {} invalidated ({:?}), metric {}->16", network, reason, previous_metric),
            EventPayload::RouteInvalidated {
                network: network.clone(),
                previous_metric: *previous_metric,
                reason,
            },
        ),
        TimerTransition::HoldDownStarted { network, previous_metric } => (
            format!("Route to {} entered hold-down ({:?}), metric {}->16", network, reason, previous_metric),
            EventPayload::HoldDownStarted {
                network: network.clone(),
                previous_metric: *previous_metric,
            },
        ),
        TimerTransition::HoldDownExpired { network } => (
            format!("Hold-down expired for {}", network),
            EventPayload::HoldDownExpired { network: network.clone() },
        ),
        TimerTransition::Flushed { network } => (
            format!("Route to {} flushed from table", network),
            EventPayload::RouteFlushed { network: network.clone() },
        ),
    }
}
