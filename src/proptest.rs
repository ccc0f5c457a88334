use crate::procedural::{BarChain, DecomposedProblem};
use ::proptest::collection::vec;
use ::proptest::prelude::*;
use nalgebra::DVector;

/// Parameters for generating [`BarChain`]s.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BarChainParams {
    pub max_subdomains: usize,
    pub max_elements_per_subdomain: usize,
    pub max_lanes: usize,
}

impl Default for BarChainParams {
    fn default() -> Self {
        Self {
            max_subdomains: 5,
            max_elements_per_subdomain: 4,
            max_lanes: 3,
        }
    }
}

impl Arbitrary for BarChain {
    type Parameters = BarChainParams;
    type Strategy = BoxedStrategy<Self>;

    /// Chains with at least one fixed end, so that the undecomposed problem is regular.
    fn arbitrary_with(params: Self::Parameters) -> Self::Strategy {
        let fixed_ends = prop_oneof![Just((true, false)), Just((false, true)), Just((true, true))];
        (
            1..=params.max_subdomains.max(1),
            1..=params.max_elements_per_subdomain.max(1),
            1..=params.max_lanes.max(1),
            fixed_ends,
        )
            .prop_map(|(num_subdomains, elements_per_subdomain, lanes, (fix_left, fix_right))| {
                BarChain::new(num_subdomains, elements_per_subdomain)
                    .with_lanes(lanes)
                    .with_fixed_ends(fix_left, fix_right)
            })
            .boxed()
    }
}

/// A decomposed bar chain with arbitrary nodal loads in `[-10, 10]`.
pub fn decomposed_bar_chain(params: BarChainParams) -> impl Strategy<Value = DecomposedProblem<f64>> {
    any_with::<BarChain>(params).prop_flat_map(|chain| {
        let num_loads = chain.num_nodes() * chain.lanes;
        vec(-10.0..10.0, num_loads).prop_map(move |loads| chain.decompose(|node, lane| loads[node * chain.lanes + lane]))
    })
}

/// Vectors of the given length with entries in `[-10, 10]`.
pub fn dvector(len: usize) -> impl Strategy<Value = DVector<f64>> {
    vec(-10.0..10.0, len).prop_map(DVector::from_vec)
}
