use rip_sim::config::{LinkDefinition, RouterDefinition, TopologyConfig};

/// Every router `X` owns a single network named `NX`.
pub fn network_of(router: &str) -> String {
    format!("N{router}")
}

pub fn topology(nodes: &[&str], links: &[(&str, &str)]) -> TopologyConfig {
    TopologyConfig {
        routers: nodes
            .iter()
            .map(|id| RouterDefinition::new(*id, &[network_of(id).as_str()]))
            .collect(),
        links: links.iter().map(|(a, b)| LinkDefinition::up(*a, *b)).collect(),
        ..Default::default()
    }
}

pub fn pair() -> TopologyConfig {
    topology(&["A", "B"], &[("A", "B")])
}

pub fn chain() -> TopologyConfig {
    topology(&["A", "B", "C"], &[("A", "B"), ("B", "C")])
}

/// Shortest hop counts from 1: 2 and 3 are adjacent, 4 is two links
/// away, 5 and 6 three, 7 four.
pub fn mesh() -> TopologyConfig {
    topology(
        &["1", "2", "3", "4", "5", "6", "7"],
        &[
            ("1", "2"),
            ("1", "3"),
            ("2", "3"),
            ("2", "4"),
            ("3", "4"),
            ("4", "5"),
            ("4", "6"),
            ("5", "6"),
            ("6", "7"),
        ],
    )
}

/// A line of `len` routers named R0..R{len-1}.
pub fn line(len: usize) -> TopologyConfig {
    let names: Vec<String> = (0..len).map(|i| format!("R{i}")).collect();
    let nodes: Vec<&str> = names.iter().map(String::as_str).collect();
    let links: Vec<(&str, &str)> = nodes.windows(2).map(|w| (w[0], w[1])).collect();
    topology(&nodes, &links)
}
