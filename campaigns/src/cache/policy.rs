//! Cache TTLs and geographic bucketing precision.
//!
//! This module is the single tuning surface for cache behavior. Staleness of
//! any cached result is bounded by whichever comes first: TTL expiry, or the
//! next write's invalidation sweep.

/// Campaign detail views embed vote counts and mutate on every vote and
/// comment, so they get the shortest TTL: if an invalidation is ever lost
/// (store unreachable at write time), a stale count survives at most a
/// minute.
pub const CAMPAIGN_DETAIL_TTL_SECONDS: u64 = 60;

/// Text-search results are swept on every campaign write, so the TTL only
/// backstops lost invalidations. Five minutes trades a bounded staleness
/// window for a useful hit rate on popular queries.
pub const SEARCH_TTL_SECONDS: u64 = 300;

/// Geo results share the search reasoning: sweep-on-write is the primary
/// freshness mechanism, TTL is the backstop.
pub const GEO_TTL_SECONDS: u64 = 300;

/// City aggregates drift slowly (a new campaign moves a centroid by meters)
/// and tolerate staleness, so they keep the longest TTL.
pub const CITY_STATS_TTL_SECONDS: u64 = 900;

/// A user's own campaign list should reflect their writes quickly even if a
/// targeted invalidation is missed, so it sits between detail and search.
pub const USER_CAMPAIGNS_TTL_SECONDS: u64 = 120;

/// Radius bounds enforced before key derivation. The floor keeps every
/// radius comfortably above the finest bucket width (see the tier mapping
/// invariant below); the ceiling keeps the haversine scan bounded.
pub const MIN_RADIUS_METERS: f64 = 250.0;
pub const MAX_RADIUS_METERS: f64 = 100_000.0;

/// Radii at or above this use city-level bucketing; below it, neighborhood.
const CITY_TIER_RADIUS_METERS: f64 = 5_000.0;

// One degree of latitude is ~111.32 km, so each decimal place of rounding
// divides the bucket width by ten.
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Coordinate rounding applied before geo-key derivation, so that map pans
/// smaller than the bucket share a cache entry instead of each producing a
/// unique key.
///
/// Invariant: a tier's bucket width must not exceed the smallest radius
/// tolerance of the query classes mapped to it, or cached results become
/// geographically wrong for edge queries. `tier_for_radius` and the bounds
/// above are chosen together to keep that true; the test below pins it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecisionTier {
    /// 2 decimal places, ~1.1 km buckets.
    CityLevel,
    /// 3 decimal places, ~110 m buckets.
    NeighborhoodLevel,
}

impl PrecisionTier {
    /// Fixed decimal-place policy: coordinates are formatted with exactly
    /// this many decimals, so float representation noise cannot split a
    /// bucket.
    pub const fn decimal_places(self) -> usize {
        match self {
            PrecisionTier::CityLevel => 2,
            PrecisionTier::NeighborhoodLevel => 3,
        }
    }

    /// Worst-case distance between two points that round to the same
    /// bucketed coordinate, along one axis.
    pub fn bucket_width_meters(self) -> f64 {
        METERS_PER_DEGREE / 10f64.powi(self.decimal_places() as i32)
    }
}

/// Pick the bucketing tier for a radius query: wide searches tolerate
/// kilometre-scale bucketing, tight ones get street-level buckets.
pub fn tier_for_radius(radius_meters: f64) -> PrecisionTier {
    if radius_meters >= CITY_TIER_RADIUS_METERS {
        PrecisionTier::CityLevel
    } else {
        PrecisionTier::NeighborhoodLevel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_places_per_tier() {
        assert_eq!(PrecisionTier::CityLevel.decimal_places(), 2);
        assert_eq!(PrecisionTier::NeighborhoodLevel.decimal_places(), 3);
    }

    #[test]
    fn test_bucket_width_never_exceeds_radius_tolerance() {
        // Every radius the API accepts maps to a tier whose bucket is finer
        // than the radius itself.
        assert!(
            PrecisionTier::NeighborhoodLevel.bucket_width_meters() <= MIN_RADIUS_METERS,
            "neighborhood buckets are wider than the smallest allowed radius"
        );
        assert!(
            PrecisionTier::CityLevel.bucket_width_meters() <= CITY_TIER_RADIUS_METERS,
            "city buckets are wider than the smallest radius mapped to them"
        );
    }

    #[test]
    fn test_tier_for_radius_boundaries() {
        assert_eq!(
            tier_for_radius(MIN_RADIUS_METERS),
            PrecisionTier::NeighborhoodLevel
        );
        assert_eq!(tier_for_radius(4_999.0), PrecisionTier::NeighborhoodLevel);
        assert_eq!(tier_for_radius(5_000.0), PrecisionTier::CityLevel);
        assert_eq!(tier_for_radius(MAX_RADIUS_METERS), PrecisionTier::CityLevel);
    }
}
