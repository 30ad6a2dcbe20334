//! Balancing arithmetic shared by the build stages and the emitter.
//!
//! All of it is static and order-dependent: the same document always yields
//! the same assignment, and nothing here rebalances.

use crate::Result;
use crate::error::invalid;
use std::ops::Range;

/// Stretch `hosts` to cover `names` daemons: each host is repeated
/// `ceil(names / hosts)` times in place, so consecutive daemons share a host.
///
/// The result may be longer than `names`; callers pair it left to right.
pub fn replicate_hosts(hosts: &[String], names: usize) -> Vec<String> {
    if hosts.is_empty() || hosts.len() == names {
        return hosts.to_vec();
    }
    let copies = names.div_ceil(hosts.len()).max(1);
    hosts
        .iter()
        .flat_map(|h| std::iter::repeat_n(h.clone(), copies))
        .collect()
}

/// Cycle `ports` until there is one per endpoint name. Lists that are already
/// long enough are returned unchanged.
pub fn replicate_ports(ports: &[String], names: usize) -> Vec<String> {
    if ports.is_empty() || ports.len() >= names {
        return ports.to_vec();
    }
    ports.iter().cycle().take(names).cloned().collect()
}

/// Assign each endpoint to the sampler daemon that serves it.
///
/// With `ports_per_daemon = endpoints / daemons`, the walk stays on the
/// current daemon while the countdown is above one, then moves on to the next.
pub fn assign_endpoints(endpoints: &[String], daemons: &[String]) -> Result<Vec<(String, String)>> {
    if daemons.is_empty() {
        invalid!("Error building producer config: no sampler daemons to assign endpoints to");
    }
    let ports_per_daemon = endpoints.len() as f64 / daemons.len() as f64;
    let mut countdown = ports_per_daemon;
    let mut next = 0usize;
    let mut out = Vec::with_capacity(endpoints.len());
    for endpoint in endpoints {
        let daemon = if countdown > 1.0 {
            countdown -= 1.0;
            daemons.get(next)
        } else {
            countdown = ports_per_daemon;
            next += 1;
            daemons.get(next - 1)
        };
        let Some(daemon) = daemon else {
            invalid!(
                "Error building producer config:\n\
                 Please ensure \"endpoints\" is configured to the correct number of ports specified."
            );
        };
        out.push((endpoint.clone(), daemon.clone()));
    }
    Ok(out)
}

/// Slice of the group's producer list owned by aggregator `index` out of
/// `aggregators`: `share = ceil(total / aggregators)` items starting at
/// `index * share`, clipped to the list.
pub fn producer_share(total: usize, aggregators: usize, index: usize) -> Range<usize> {
    if aggregators == 0 {
        return 0..0;
    }
    let share = total.div_ceil(aggregators);
    let start = (index * share).min(total);
    let end = (start + share).min(total);
    start..end
}
