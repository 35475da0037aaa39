use std::cmp::Ordering;

use serde::Serialize;
use tracing::info;

use crate::error::AppError;
use crate::geo::{haversine_km, GeoPoint};
use crate::models::delivery::DeliveryRequest;
use crate::state::AppState;

/// A delivery paired with the point it is routed to.
#[derive(Debug, Clone)]
pub struct RouteCandidate {
    pub location: GeoPoint,
    pub delivery: DeliveryRequest,
}

impl RouteCandidate {
    /// `None` for deliveries whose address was never resolved.
    pub fn from_delivery(delivery: DeliveryRequest) -> Option<Self> {
        delivery.location.map(|location| Self { location, delivery })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteStop {
    pub sequence: usize,
    /// Distance from the previous stop, or from the depot for the first one.
    pub leg_distance_km: f64,
    pub delivery: DeliveryRequest,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizedRoute {
    pub depot: GeoPoint,
    pub total_distance_km: f64,
    pub stops: Vec<RouteStop>,
}

pub struct RouteOptimizer {
    depot: GeoPoint,
}

impl RouteOptimizer {
    pub fn new(depot: GeoPoint) -> Self {
        Self { depot }
    }

    /// Greedy nearest-neighbour walk from the depot. Every candidate appears
    /// exactly once. Equidistant candidates are taken lowest id first.
    pub fn optimize(&self, candidates: Vec<RouteCandidate>) -> Result<OptimizedRoute, AppError> {
        if candidates.is_empty() {
            return Err(AppError::NothingToOptimize);
        }

        let mut remaining = candidates;
        let mut stops = Vec::with_capacity(remaining.len());
        let mut current = self.depot;
        let mut total_distance_km = 0.0;

        while !remaining.is_empty() {
            let (nearest_index, leg_distance_km) = remaining
                .iter()
                .enumerate()
                .map(|(index, candidate)| (index, haversine_km(&current, &candidate.location)))
                .min_by(|a, b| {
                    a.1.total_cmp(&b.1).then_with(|| {
                        compare_ids(&remaining[a.0].delivery, &remaining[b.0].delivery)
                    })
                })
                .ok_or_else(|| AppError::Internal("route candidates exhausted".to_string()))?;

            let next = remaining.swap_remove(nearest_index);
            current = next.location;
            total_distance_km += leg_distance_km;
            stops.push(RouteStop {
                sequence: stops.len() + 1,
                leg_distance_km,
                delivery: next.delivery,
            });
        }

        Ok(OptimizedRoute {
            depot: self.depot,
            total_distance_km,
            stops,
        })
    }
}

fn compare_ids(a: &DeliveryRequest, b: &DeliveryRequest) -> Ordering {
    a.id.cmp(&b.id)
}

/// Routes every pending delivery that has a location.
pub fn optimize_pending(state: &AppState) -> Result<OptimizedRoute, AppError> {
    let candidates: Vec<RouteCandidate> = state
        .store
        .deliveries_where(DeliveryRequest::is_routable)
        .into_iter()
        .filter_map(RouteCandidate::from_delivery)
        .collect();

    let result = RouteOptimizer::new(state.settings.depot).optimize(candidates);
    let outcome = if result.is_ok() { "ok" } else { "empty" };
    state
        .metrics
        .route_optimizations_total
        .with_label_values(&[outcome])
        .inc();

    let route = result?;
    info!(
        stops = route.stops.len(),
        total_distance_km = route.total_distance_km,
        "route optimized"
    );
    Ok(route)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use uuid::Uuid;

    use super::{RouteCandidate, RouteOptimizer};
    use crate::error::AppError;
    use crate::geo::{haversine_km, GeoPoint};
    use crate::models::delivery::DeliveryRequest;

    const KM_PER_DEGREE: f64 = 6_371.0 * std::f64::consts::PI / 180.0;

    const DEPOT: GeoPoint = GeoPoint { lat: 0.0, lng: 0.0 };

    fn candidate(id_seed: u128, lat: f64, lng: f64) -> RouteCandidate {
        let mut delivery = DeliveryRequest::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            1,
            "somewhere".to_string(),
            Some(GeoPoint { lat, lng }),
            None,
        );
        delivery.id = Uuid::from_u128(id_seed);
        RouteCandidate::from_delivery(delivery).unwrap()
    }

    fn scattered(count: u128) -> Vec<RouteCandidate> {
        (1..=count)
            .map(|seed| {
                let angle = seed as f64 * 2.399;
                let radius = 0.01 * seed as f64;
                candidate(seed, radius * angle.sin(), radius * angle.cos())
            })
            .collect()
    }

    #[test]
    fn empty_batch_is_reported() {
        let result = RouteOptimizer::new(DEPOT).optimize(Vec::new());
        assert!(matches!(result, Err(AppError::NothingToOptimize)));
    }

    #[test]
    fn visits_nearest_first_then_nearest_to_it() {
        // 5 km north, 2 km east, 8 km south of the depot, in that input order.
        let north = candidate(1, 5.0 / KM_PER_DEGREE, 0.0);
        let east = candidate(2, 0.0, 2.0 / KM_PER_DEGREE);
        let south = candidate(3, -8.0 / KM_PER_DEGREE, 0.0);

        let route = RouteOptimizer::new(DEPOT)
            .optimize(vec![north, east, south])
            .unwrap();

        let order: Vec<u128> = route.stops.iter().map(|stop| stop.delivery.id.as_u128()).collect();
        assert_eq!(order, vec![2, 1, 3]);
        assert!((route.stops[0].leg_distance_km - 2.0).abs() < 0.01);
        assert_eq!(route.stops[0].sequence, 1);
    }

    #[test]
    fn output_is_a_permutation_of_the_input() {
        let input = scattered(25);
        let expected: HashSet<Uuid> = input.iter().map(|c| c.delivery.id).collect();

        let route = RouteOptimizer::new(DEPOT).optimize(input).unwrap();

        let visited: Vec<Uuid> = route.stops.iter().map(|stop| stop.delivery.id).collect();
        let unique: HashSet<Uuid> = visited.iter().copied().collect();
        assert_eq!(visited.len(), 25);
        assert_eq!(unique, expected);
    }

    #[test]
    fn each_step_takes_the_closest_remaining_stop() {
        let input = scattered(15);
        let route = RouteOptimizer::new(DEPOT).optimize(input.clone()).unwrap();

        let mut remaining: Vec<RouteCandidate> = input;
        let mut current = DEPOT;
        for stop in &route.stops {
            let best = remaining
                .iter()
                .map(|c| haversine_km(&current, &c.location))
                .fold(f64::INFINITY, f64::min);
            let chosen = stop.delivery.location.unwrap();
            assert!((haversine_km(&current, &chosen) - best).abs() < 1e-12);

            remaining.retain(|c| c.delivery.id != stop.delivery.id);
            current = chosen;
        }
        assert!(remaining.is_empty());
    }

    #[test]
    fn ties_go_to_the_lowest_id() {
        let west = candidate(9, 0.0, -0.01);
        let east = candidate(4, 0.0, 0.01);

        let route = RouteOptimizer::new(DEPOT).optimize(vec![west, east]).unwrap();

        assert_eq!(route.stops[0].delivery.id, Uuid::from_u128(4));
    }

    #[test]
    fn total_distance_is_the_sum_of_legs() {
        let route = RouteOptimizer::new(DEPOT).optimize(scattered(6)).unwrap();
        let sum: f64 = route.stops.iter().map(|stop| stop.leg_distance_km).sum();
        assert!((route.total_distance_km - sum).abs() < 1e-9);
    }
}
