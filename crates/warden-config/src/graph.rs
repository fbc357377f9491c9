use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use warden_types::ServiceSpec;

use crate::ConfigError;

/// Orders `roots` and everything they transitively depend on so that every
/// service comes after its dependencies. Among services that are ready at the
/// same time the alphabetically smallest goes first, which keeps the order
/// stable across runs.
pub(crate) fn toposort(
    services: &BTreeMap<String, ServiceSpec>,
    roots: &[String],
) -> Result<Vec<String>, ConfigError> {
    let mut to_process: VecDeque<&str> = roots.iter().map(String::as_str).collect();
    let mut processed = BTreeSet::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::with_capacity(services.len());
    let mut deps_count: BTreeMap<&str, usize> = BTreeMap::new();

    while let Some(name) = to_process.pop_front() {
        if !processed.insert(name) {
            continue;
        }
        let Some(service) = services.get(name) else {
            return Err(ConfigError::UnknownService(name.to_owned()));
        };

        dependents.entry(name).or_default();
        let count = deps_count.entry(name).or_default();

        for dependency in &service.depends_on {
            if !services.contains_key(dependency) {
                return Err(ConfigError::UnknownDependency {
                    service: name.to_owned(),
                    dependency: dependency.clone(),
                });
            }
            dependents.entry(dependency.as_str()).or_default().push(name);
            *count += 1;
            to_process.push_back(dependency.as_str());
        }
    }

    let mut ready: BTreeSet<&str> = deps_count
        .iter()
        .filter_map(|(name, &count)| (count == 0).then_some(*name))
        .collect();

    let mut result = Vec::with_capacity(deps_count.len());
    while let Some(name) = ready.pop_first() {
        result.push(name.to_owned());

        for dependent in dependents.get(name).into_iter().flatten() {
            if let Some(count) = deps_count.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    if result.len() != processed.len() {
        let stuck = deps_count
            .into_iter()
            .filter_map(|(name, count)| (count > 0).then(|| name.to_owned()))
            .collect();
        return Err(ConfigError::Cycle(stuck));
    }

    Ok(result)
}
