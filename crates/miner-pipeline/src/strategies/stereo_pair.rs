//! `StereoPair`: overlap pairing screened and ranked for stereo suitability.
//!
//! Tier one (`ImageStrength`) screens individual records before pairing.
//! Tier two (`StereoStrength`) screens quantities derived from each pair:
//! parallax and shadow-tip distances, resolution ratio, azimuth deltas, the
//! convergence angle and the expected vertical precision. Every threshold is
//! a `(min, max[, pivot[, weight]])` tuple; a value outside `[min, max]`
//! fails, and values with a pivot are ranked by their distance from it.

use miner_pvl::{PvlGroup, PvlObject};
use miner_types::{to_double, KeywordMap, MinerError, Resource, ResourceList, Result, SharedResource};

use crate::calculator::format_number;
use crate::registry::StrategyFactory;
use crate::strategies::calculator::CalculatorStrategy;
use crate::strategies::gis_overlap::{GisOverlapStrategy, PairHooks};
use crate::strategy::{Strategy, StrategyCore};

/// Stand-in for a zero convergence term in the vertical precision.
const MIN_STEREO_TERM: f64 = 1.0e-7;

/// One ranked threshold: `min, max[, pivot[, weight]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub name: String,
    pub values: Vec<f64>,
}

impl Constraint {
    /// Parse every keyword of a threshold group.
    pub fn from_group(group: &PvlGroup) -> Result<Vec<Constraint>> {
        group.keywords.iter().map(Self::from_keyword).collect()
    }

    fn from_keyword(keyword: &miner_types::Keyword) -> Result<Constraint> {
        let mut values = Vec::with_capacity(keyword.values.len());
        for (i, text) in keyword.values.iter().enumerate() {
            let value = to_double(text).map_err(|_| {
                MinerError::Config(format!(
                    "Error converting value [{}] in keyword [{}] to double.",
                    i + 1,
                    keyword.name
                ))
            })?;
            values.push(value);
        }
        if values.len() < 2 {
            return Err(MinerError::Config(format!(
                "Criteria keyword [{}] requires at least a minimum and maximum value.",
                keyword.name
            )));
        }
        if values.len() >= 3 && (values[2] < values[0] || values[2] > values[1]) {
            return Err(MinerError::Config(format!(
                "Criteria keyword [{}] pivot value [{}] exceeds min/max ranges [{},{}].",
                keyword.name, keyword.values[2], keyword.values[0], keyword.values[1]
            )));
        }
        Ok(Constraint {
            name: keyword.name.clone(),
            values,
        })
    }

    pub fn minimum(&self) -> f64 {
        self.values[0]
    }

    pub fn maximum(&self) -> f64 {
        self.values[1]
    }

    pub fn pivot(&self) -> Option<f64> {
        self.values.get(2).copied()
    }

    pub fn weight(&self) -> f64 {
        self.values.get(3).copied().unwrap_or(1.0)
    }

    pub fn passes(&self, value: f64) -> bool {
        value >= self.minimum() && value <= self.maximum()
    }

    /// `weight * (1 - |pivot - value| / range)`, clamped to `[0, weight]`.
    /// Thresholds without a pivot rank zero.
    pub fn rank(&self, value: f64) -> f64 {
        let Some(pivot) = self.pivot() else {
            return 0.0;
        };
        let range = (pivot - self.minimum()).abs().max((self.maximum() - pivot).abs());
        let raw = if range > 0.0 {
            1.0 - (pivot - value).abs() / range
        } else if value == pivot {
            1.0
        } else {
            0.0
        };
        let weight = self.weight();
        (raw * weight).clamp(weight.min(0.0), weight.max(0.0))
    }
}

/// Pair hooks carrying the stereo screens and the ranking calculator.
pub struct StereoHooks {
    image_strength: Vec<Constraint>,
    stereo_strength: Vec<Constraint>,
    keyword_map: KeywordMap,
    pixel_precision: f64,
    use_stereo_angle: bool,
    calculator: CalculatorStrategy,
}

impl StereoHooks {
    fn new(
        definition: &PvlObject,
        globals: &[SharedResource],
        factory: &StrategyFactory,
    ) -> Result<Self> {
        let calculator = CalculatorStrategy::new(definition, globals, factory)?;
        let core = calculator.core();
        let image_strength = match definition.group("ImageStrength") {
            Some(group) => Constraint::from_group(group)?,
            None => Vec::new(),
        };
        let stereo_strength = definition
            .group("StereoStrength")
            .ok_or_else(|| {
                MinerError::Config(format!(
                    "StereoPair strategy [{}] requires a StereoStrength group",
                    core.name()
                ))
            })
            .and_then(Constraint::from_group)?;
        let keyword_map = definition
            .group("KeywordMap")
            .map(PvlGroup::to_map)
            .unwrap_or_default();
        let pixel_precision = core.double_or("PixelPrecisionMatch", 2.0)?;
        let use_stereo_angle = core.bool_or("UseStereoAngle", true)?;
        core.debug(&format!(
            "{} image and {} stereo constraints, PixelPrecisionMatch = {pixel_precision}",
            image_strength.len(),
            stereo_strength.len()
        ));
        Ok(Self {
            image_strength,
            stereo_strength,
            keyword_map,
            pixel_precision,
            use_stereo_angle,
            calculator,
        })
    }

    fn debug(&self, message: &str) {
        self.calculator.core().debug(message);
    }

    /// The record keyword a constraint or stereo input reads from.
    fn mapped(&self, key: &str) -> String {
        self.keyword_map.value_or(key, key)
    }

    fn number(&self, resource: &Resource, key: &str) -> Result<f64> {
        to_double(&resource.value(&self.mapped(key), 0)?)
    }

    /// Every constraint must hold. A missing or non-numeric keyword fails.
    fn passes(&self, resource: &Resource, constraints: &[Constraint]) -> bool {
        let mut bad = 0;
        for constraint in constraints {
            let key = self.mapped(&constraint.name);
            if !resource.exists(&key) {
                self.debug(&format!(
                    "{}::({key}) is missing from {}",
                    constraint.name,
                    resource.name()
                ));
                bad += 1;
                continue;
            }
            let ok = resource
                .value(&key, 0)
                .ok()
                .and_then(|v| to_double(&v).ok())
                .is_some_and(|v| constraint.passes(v));
            if !ok {
                self.debug(&format!(
                    "{}::({key}) of {} is outside [{}, {}]",
                    constraint.name,
                    resource.name(),
                    constraint.minimum(),
                    constraint.maximum()
                ));
                bad += 1;
            }
        }
        bad == 0
    }

    /// Sum of the ranks of every present constraint, each also stored on
    /// `out` as `<Constraint><suffix>`.
    fn rank(&self, resource: &Resource, constraints: &[Constraint], out: &Resource, suffix: &str) -> f64 {
        let mut total = 0.0;
        for constraint in constraints {
            let Ok(value) = self.number(resource, &constraint.name) else {
                continue;
            };
            let rank = constraint.rank(value);
            out.add(&format!("{}{suffix}", constraint.name), format_number(rank));
            total += rank;
        }
        total
    }

    fn distance(&self, a: &Resource, b: &Resource, x: &str, y: &str) -> Result<f64> {
        let dx = self.number(a, x)? - self.number(b, x)?;
        let dy = self.number(a, y)? - self.number(b, y)?;
        Ok(dx.hypot(dy))
    }

    /// Angular difference of `source` between the records, when both have it.
    fn delta(&self, a: &Resource, b: &Resource, parameter: &str, source: &str, out: &Resource) {
        let key = self.mapped(source);
        if !(a.exists(&key) && b.exists(&key)) {
            return;
        }
        if let (Ok(first), Ok(second)) = (self.number(a, source), self.number(b, source)) {
            let delta = ((second - first).to_radians().cos()).acos().to_degrees();
            out.add(parameter, format_number(delta));
        }
    }

    /// First numeric value of `key` in `pool`.
    fn pool_value(&self, key: &str, pool: &[&Resource]) -> Option<f64> {
        let key = self.mapped(key);
        pool.iter()
            .find(|r| r.exists(&key))
            .and_then(|r| r.value(&key, 0).ok())
            .and_then(|v| to_double(&v).ok())
    }

    /// Convergence angle in degrees between the two look vectors.
    fn stereo_angle(
        &self,
        a: &Resource,
        b: &Resource,
        stereo: &Resource,
        globals: &[SharedResource],
    ) -> Option<f64> {
        let look = |side: &Resource| -> Option<[f64; 3]> {
            let mut pool: Vec<&Resource> = vec![side, stereo];
            pool.extend(globals.iter().map(|g| g.as_ref()));
            let radius = self.pool_value("CenterRadius", &pool)?;
            let lat = self.pool_value("CenterLatitude", &pool)?.to_radians();
            let lon = self.pool_value("CenterLongitude", &pool)?.to_radians();
            let distance = self.pool_value("TargetCenterDistance", &pool)?;
            let sc_lat = self.pool_value("SubspacecraftLatitude", &pool)?.to_radians();
            let sc_lon = self.pool_value("SubspacecraftLongitude", &pool)?.to_radians();
            let surface = radius / 1000.0;
            Some([
                distance * sc_lon.cos() * sc_lat.cos() - surface * lon.cos() * lat.cos(),
                distance * sc_lon.sin() * sc_lat.cos() - surface * lon.sin() * lat.cos(),
                distance * sc_lat.sin() - surface * lat.sin(),
            ])
        };
        let va = look(a)?;
        let vb = look(b)?;
        let dot: f64 = va.iter().zip(&vb).map(|(x, y)| x * y).sum();
        let norm = |v: &[f64; 3]| v.iter().map(|x| x * x).sum::<f64>().sqrt();
        let angle = (dot / (norm(&va) * norm(&vb))).acos().to_degrees();
        angle.is_finite().then_some(angle)
    }

    /// Derive, screen and rank the stereo quantities of a pair. `Ok(false)`
    /// means the pair failed a `StereoStrength` threshold.
    fn compute_stereo(
        &mut self,
        a: &Resource,
        b: &Resource,
        stereo: &SharedResource,
        suffixes: (&str, &str),
        globals: &[SharedResource],
    ) -> Result<bool> {
        let rank_a = self.rank(a, &self.image_strength, stereo, &format!("Rank{}", suffixes.0));
        let rank_b = self.rank(b, &self.image_strength, stereo, &format!("Rank{}", suffixes.1));
        stereo.add(&format!("ImageStrengthRank{}", suffixes.0), format_number(rank_a));
        stereo.add(&format!("ImageStrengthRank{}", suffixes.1), format_number(rank_b));
        stereo.add("ImageStrengthRank", format_number((rank_a + rank_b) / 2.0));

        let parallax = self.distance(a, b, "ParallaxX", "ParallaxY")?;
        stereo.add("ParallaxHeightRatio", format_number(parallax));
        let shadow = self.distance(a, b, "ShadowX", "ShadowY")?;
        stereo.add("ShadowTipDistance", format_number(shadow));

        let res_a = self.number(a, "Resolution")?;
        let res_b = self.number(b, "Resolution")?;
        let mut ratio = res_a / res_b;
        if ratio < 1.0 {
            ratio = 1.0 / ratio;
        }
        stereo.add("ResolutionRatio", format_number(ratio));

        self.delta(a, b, "DeltaSolarAzimuth", "SubSolarGroundAzimuth", stereo);
        self.delta(a, b, "DeltaSpacecraftAzimuth", "SubSpacecraftGroundAzimuth", stereo);

        let mut term = parallax;
        if let Some(angle) = self.stereo_angle(a, b, stereo, globals) {
            stereo.add("StereoAngle", format_number(angle));
            if self.use_stereo_angle {
                term = angle.to_radians().tan();
            }
        }
        if term.abs() < f64::EPSILON {
            term = MIN_STEREO_TERM;
        }
        let precision = self.pixel_precision * res_a.max(res_b) / term;
        stereo.add("VerticalPrecision", format_number(precision));

        if !self.passes(stereo, &self.stereo_strength) {
            return Ok(false);
        }
        let rank = self.rank(stereo, &self.stereo_strength, stereo, "Rank");
        stereo.add("StereoStrengthRank", format_number(rank));

        self.calculator.apply_one(stereo, globals)?;
        Ok(true)
    }
}

impl PairHooks for StereoHooks {
    fn accept_candidate(&self, candidate: &SharedResource) -> bool {
        self.passes(candidate, &self.image_strength)
    }

    fn finish_pair(
        &mut self,
        composite: SharedResource,
        a: &SharedResource,
        b: &SharedResource,
        suffixes: (&str, &str),
        globals: &[SharedResource],
    ) -> Result<Option<SharedResource>> {
        if a.is_equal(b) {
            return Ok(None);
        }
        match self.compute_stereo(a, b, &composite, suffixes, globals) {
            Ok(true) => {
                self.debug(&format!("StereoPair {}/{} is a match", a.name(), b.name()));
                Ok(Some(composite))
            }
            Ok(false) => {
                self.debug(&format!("StereoPair {}/{} failed", a.name(), b.name()));
                Ok(None)
            }
            Err(err) => {
                self.debug(&format!(
                    "StereoPair {}/{} incurred an error: {err}",
                    a.name(),
                    b.name()
                ));
                Ok(None)
            }
        }
    }
}

pub struct StereoPairStrategy {
    overlap: GisOverlapStrategy<StereoHooks>,
}

impl StereoPairStrategy {
    pub fn new(
        definition: &PvlObject,
        globals: &[SharedResource],
        factory: &StrategyFactory,
    ) -> Result<Self> {
        let hooks = StereoHooks::new(definition, globals, factory)?;
        let overlap = GisOverlapStrategy::with_hooks(definition, globals, factory, hooks)?;
        Ok(Self { overlap })
    }

    pub fn image_strength(&self) -> &[Constraint] {
        &self.overlap.hooks().image_strength
    }

    pub fn stereo_strength(&self) -> &[Constraint] {
        &self.overlap.hooks().stereo_strength
    }
}

impl Strategy for StereoPairStrategy {
    fn core(&self) -> &StrategyCore {
        self.overlap.core()
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        self.overlap.core_mut()
    }

    /// Discard records failing `ImageStrength`, then pair the rest.
    fn apply(&mut self, resources: &mut ResourceList, globals: &[SharedResource]) -> Result<usize> {
        let hooks = self.overlap.hooks();
        for resource in resources.iter().filter(|r| r.is_active()) {
            if !hooks.passes(resource, &hooks.image_strength) {
                resource.discard();
            }
        }
        self.overlap.apply(resources, globals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gis::EnvelopeGeometry;
    use crate::strategies::testing::definition;
    use miner_types::Bounds;
    use std::rc::Rc;

    fn constraint(values: &[f64]) -> Constraint {
        Constraint {
            name: "C".into(),
            values: values.to_vec(),
        }
    }

    #[test]
    fn rank_formula() {
        let c = constraint(&[100.0, 500.0, 200.0]);
        assert_eq!(c.rank(200.0), 1.0);
        assert!((c.rank(350.0) - 0.5).abs() < 1e-12);
        assert_eq!(c.rank(500.0), 0.0);
        let weighted = constraint(&[0.0, 10.0, 5.0, 4.0]);
        assert!((weighted.rank(7.5) - 2.0).abs() < 1e-12);
        assert_eq!(weighted.rank(50.0), 0.0);
        assert_eq!(constraint(&[0.0, 1.0]).rank(0.5), 0.0);
    }

    #[test]
    fn bad_thresholds_are_config_errors() {
        let factory = StrategyFactory::new();
        let pivot = definition(
            "Object = Strategy\n Name = s\n Type = StereoPair\n \
             Group = StereoStrength\n Resolution = (1, 5, 9)\n End_Group\nEnd_Object",
        );
        let err = factory.create(&pivot, &[]).err().unwrap();
        assert!(err.is_config());
        assert!(err.to_string().contains("pivot value [9] exceeds min/max ranges [1,5]"));

        let text = definition(
            "Object = Strategy\n Name = s\n Type = StereoPair\n \
             Group = StereoStrength\n Resolution = (1, abc)\n End_Group\nEnd_Object",
        );
        let err = factory.create(&text, &[]).err().unwrap();
        assert!(err.to_string().contains("Error converting value [2] in keyword [Resolution]"));

        let missing = definition("Object = Strategy\n Name = s\n Type = StereoPair\nEnd_Object");
        assert!(factory.create(&missing, &[]).err().unwrap().is_config());
    }

    fn image(name: &str, minx: f64, res: &str, px: &str) -> SharedResource {
        let r = Resource::shared(name);
        r.add("PixelRes", res);
        r.add("ParallaxX", px);
        r.add("ParallaxY", "0");
        r.add("ShadowX", "0");
        r.add("ShadowY", "0");
        r.add("SubSolarGroundAzimuth", "350");
        r.set_geometry(Some(
            EnvelopeGeometry::rectangle(Bounds::new(minx, 0.0, minx + 1.0, 1.0)).shared(),
        ));
        r
    }

    const STEREO: &str = "Object = Strategy\n Name = stereo\n Type = StereoPair\n \
        UseStereoAngle = false\n PixelPrecisionMatch = 0.5\n \
        Equation = \"StereoStrengthRank + ImageStrengthRank\"\n Result = Rank\n \
        Group = KeywordMap\n Resolution = PixelRes\n End_Group\n \
        Group = ImageStrength\n Resolution = (1, 10, 2)\n End_Group\n \
        Group = StereoStrength\n ParallaxHeightRatio = (0.1, 1.0, 0.4)\n End_Group\n\
        End_Object";

    #[test]
    fn pairs_are_screened_and_ranked() {
        let mut s = StereoPairStrategy::new(&definition(STEREO), &[], &StrategyFactory::new()).unwrap();
        assert_eq!(s.image_strength().len(), 1);
        let a = image("A", 0.0, "2", "0");
        let b = image("B", 0.5, "4", "0.4");
        let far = image("far", 0.2, "2", "3");
        let coarse = image("coarse", 0.1, "20", "0.4");
        a.add("SubSolarGroundAzimuth", "10");
        let mut list = vec![Rc::clone(&a), Rc::clone(&b), Rc::clone(&far), Rc::clone(&coarse)];

        let n = s.apply(&mut list, &[]).unwrap();
        assert!(coarse.is_discarded());
        let pairs = a.asset_list("GisOverlap").unwrap();
        assert_eq!(pairs.len(), 1, "far fails the parallax band");
        let pair = &pairs[0];
        assert_eq!(pair.name(), "A_B");
        assert_eq!(pair.value("ParallaxHeightRatio", 0).unwrap(), "0.4");
        assert_eq!(pair.value("ResolutionRatio", 0).unwrap(), "2");
        assert_eq!(pair.value("ResolutionRankA", 0).unwrap(), "1");
        assert_eq!(pair.value("ImageStrengthRankB", 0).unwrap(), "0.75");
        assert_eq!(pair.value("ImageStrengthRank", 0).unwrap(), "0.875");
        assert_eq!(pair.value("ParallaxHeightRatioRank", 0).unwrap(), "1");
        assert_eq!(pair.value("StereoStrengthRank", 0).unwrap(), "1");
        assert_eq!(pair.value("Rank", 0).unwrap(), "1.875");
        let delta: f64 = pair.value("DeltaSolarAzimuth", 0).unwrap().parse().unwrap();
        assert!((delta - 20.0).abs() < 1e-9);
        // 0.5 * max(2, 4) / 0.4
        assert_eq!(pair.value("VerticalPrecision", 0).unwrap(), "5");
        assert!(!pair.exists("StereoAngle"));
        assert!(n >= 2);
        assert!(far.is_discarded());
    }

    fn run_pairs(config: &str, records: &[SharedResource]) -> usize {
        let mut s = StereoPairStrategy::new(&definition(config), &[], &StrategyFactory::new()).unwrap();
        let mut list = records.to_vec();
        s.apply(&mut list, &[]).unwrap()
    }

    #[test]
    fn missing_stereo_quantity_rejects_pair() {
        let config = STEREO.replace(
            "ParallaxHeightRatio = (0.1, 1.0, 0.4)",
            "DeltaSolarAzimuth = (0, 10, 5)",
        );
        let a = image("A", 0.0, "2", "0");
        let b = image("B", 0.5, "4", "0.4");
        for r in [&a, &b] {
            r.erase("SubSolarGroundAzimuth");
        }
        assert_eq!(run_pairs(&config, &[Rc::clone(&a), Rc::clone(&b)]), 0);
        assert!(!a.has_asset("GisOverlap"));
        assert!(a.is_discarded() && b.is_discarded());
    }

    #[test]
    fn missing_or_text_image_strength_value_discards() {
        let config = STEREO.replace("Resolution = (1, 10, 2)", "Incidence = (0, 60, 30)");
        let a = image("A", 0.0, "2", "0");
        let b = image("B", 0.5, "4", "0.4");
        assert_eq!(run_pairs(&config, &[Rc::clone(&a), Rc::clone(&b)]), 0);
        assert!(a.is_discarded() && b.is_discarded());

        let a = image("A", 0.0, "2", "0");
        let b = image("B", 0.5, "4", "0.4");
        a.add("Incidence", "high");
        b.add("Incidence", "20");
        assert_eq!(run_pairs(&config, &[Rc::clone(&a), Rc::clone(&b)]), 0);
        assert!(a.is_discarded());
        assert!(!b.has_asset("GisOverlap"));
    }

    #[test]
    fn stereo_angle_from_pool() {
        let hooks =
            StereoHooks::new(&definition(STEREO), &[], &StrategyFactory::new()).unwrap();
        let a = Resource::new("a");
        let b = Resource::new("b");
        let stereo = Resource::new("s");
        let g = Resource::shared("globals");
        for (k, v) in [
            ("CenterRadius", "0"),
            ("CenterLatitude", "0"),
            ("CenterLongitude", "0"),
            ("TargetCenterDistance", "1"),
            ("SubspacecraftLatitude", "0"),
        ] {
            g.add(k, v);
        }
        a.add("SubspacecraftLongitude", "0");
        b.add("SubspacecraftLongitude", "90");
        let angle = hooks.stereo_angle(&a, &b, &stereo, &[Rc::clone(&g)]).unwrap();
        assert!((angle - 90.0).abs() < 1e-9);

        let bare = Resource::new("bare");
        assert!(hooks.stereo_angle(&a, &bare, &stereo, &[g]).is_none());
    }
}
