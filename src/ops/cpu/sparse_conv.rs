//! CPU implementation of sparse convolution operations.

use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::ops::conv_common::{validate_bias_length, validate_weight};
use crate::ops::{ConvGeometry, SparseConvOps};
use crate::runtime::cpu::CpuClient;
use crate::runtime::cpu::sparse::{
    gather_scatter_backward, gather_scatter_forward, max_pool_backward, max_pool_forward,
};
use crate::sparse::{
    ConvMode, CoordinateSet, Rulebook, RulebookKey, SparseConvTensor, build_rulebook,
    invert_rulebook,
};
use crate::tensor::{DenseTensor, FeatureMatrix};
use std::sync::Arc;

impl<T: Element> SparseConvOps<T> for CpuClient {
    fn sparse_conv(
        &self,
        input: &SparseConvTensor<T>,
        weight: &DenseTensor<T>,
        bias: Option<&DenseTensor<T>>,
        geometry: &ConvGeometry,
        tag: &str,
    ) -> Result<SparseConvTensor<T>> {
        conv_with_mode(self, input, weight, bias, geometry, ConvMode::Regular, tag)
    }

    fn submanifold_conv(
        &self,
        input: &SparseConvTensor<T>,
        weight: &DenseTensor<T>,
        bias: Option<&DenseTensor<T>>,
        geometry: &ConvGeometry,
        tag: &str,
    ) -> Result<SparseConvTensor<T>> {
        conv_with_mode(self, input, weight, bias, geometry, ConvMode::Submanifold, tag)
    }

    fn inverse_conv(
        &self,
        input: &SparseConvTensor<T>,
        weight: &DenseTensor<T>,
        bias: Option<&DenseTensor<T>>,
        geometry: &ConvGeometry,
        tag: &str,
    ) -> Result<SparseConvTensor<T>> {
        conv_with_mode(self, input, weight, bias, geometry, ConvMode::Inverse, tag)
    }

    fn transposed_conv(
        &self,
        input: &SparseConvTensor<T>,
        weight: &DenseTensor<T>,
        bias: Option<&DenseTensor<T>>,
        geometry: &ConvGeometry,
        tag: &str,
    ) -> Result<SparseConvTensor<T>> {
        conv_with_mode(self, input, weight, bias, geometry, ConvMode::Transposed, tag)
    }

    fn sparse_max_pool(
        &self,
        input: &SparseConvTensor<T>,
        geometry: &ConvGeometry,
        tag: &str,
    ) -> Result<SparseConvTensor<T>> {
        let rulebook = self.get_or_build_rulebook(input, geometry, ConvMode::Regular, tag)?;
        let features = max_pool_forward(self, input.features(), &rulebook)?;
        input.derive(features, Arc::clone(rulebook.output_sites()))
    }

    fn sparse_conv_backward(
        &self,
        input: &SparseConvTensor<T>,
        weight: &DenseTensor<T>,
        grad_output: &FeatureMatrix<T>,
        rulebook: &Rulebook,
    ) -> Result<(FeatureMatrix<T>, DenseTensor<T>, DenseTensor<T>)> {
        check_rulebook_input(input, rulebook)?;
        gather_scatter_backward(self, input.features(), rulebook, weight, grad_output)
    }

    fn sparse_max_pool_backward(
        &self,
        input: &SparseConvTensor<T>,
        output: &SparseConvTensor<T>,
        grad_output: &FeatureMatrix<T>,
        rulebook: &Rulebook,
    ) -> Result<FeatureMatrix<T>> {
        check_rulebook_input(input, rulebook)?;
        max_pool_backward(
            self,
            input.features(),
            output.features(),
            grad_output,
            rulebook,
        )
    }

    fn get_or_build_rulebook(
        &self,
        input: &SparseConvTensor<T>,
        geometry: &ConvGeometry,
        mode: ConvMode,
        tag: &str,
    ) -> Result<Arc<Rulebook>> {
        geometry.validate(input.ndim(), "get_or_build_rulebook")?;
        let key = RulebookKey::new(tag, geometry.clone(), mode);

        if let Some(cached) = input.find_rulebook(&key) {
            if !matches_sites(cached.input_sites(), input) {
                return Err(Error::RulebookMismatch {
                    key,
                    reason: format!(
                        "cached rulebook was built for {} input sites, tensor has {} different ones",
                        cached.input_sites().len(),
                        input.num_active()
                    ),
                });
            }
            return Ok(cached);
        }

        let rulebook = match mode {
            ConvMode::Inverse => inverse_rulebook(input, &key)?,
            _ => build_rulebook(self, input.sites(), geometry, mode)?,
        };
        Ok(input.cache_rulebook(key, Arc::new(rulebook)))
    }
}

fn conv_with_mode<T: Element>(
    client: &CpuClient,
    input: &SparseConvTensor<T>,
    weight: &DenseTensor<T>,
    bias: Option<&DenseTensor<T>>,
    geometry: &ConvGeometry,
    mode: ConvMode,
    tag: &str,
) -> Result<SparseConvTensor<T>> {
    const OP: &str = "sparse_conv";

    let span = tracing::debug_span!(
        "sparse_conv",
        %mode,
        tag,
        dtype = %T::DTYPE,
        input_sites = input.num_active()
    );
    let _guard = span.enter();

    // reject bad operands before a rulebook is built or cached
    geometry.validate(input.ndim(), OP)?;
    let (_, c_out) = validate_weight(weight.shape(), geometry, input.num_channels(), OP)?;
    if let Some(bias) = bias {
        validate_bias_length(bias.shape(), c_out, OP)?;
    }

    let rulebook = client.get_or_build_rulebook(input, geometry, mode, tag)?;
    let features = gather_scatter_forward(client, input.features(), &rulebook, weight, bias)?;
    input.derive(features, Arc::clone(rulebook.output_sites()))
}

/// Derive an inverse rulebook from the forward one cached for the same tag and geometry
fn inverse_rulebook<T: Element>(input: &SparseConvTensor<T>, key: &RulebookKey) -> Result<Rulebook> {
    let regular = key.with_mode(ConvMode::Regular);
    let forward = input
        .find_rulebook(&regular)
        .or_else(|| input.find_rulebook(&key.with_mode(ConvMode::Submanifold)))
        .ok_or(Error::MissingRulebook { key: regular })?;

    if !matches_sites(forward.output_sites(), input) {
        return Err(Error::RulebookMismatch {
            key: key.clone(),
            reason: format!(
                "forward rulebook produced {} sites, inverse input has {} different ones",
                forward.output_sites().len(),
                input.num_active()
            ),
        });
    }
    invert_rulebook(&forward)
}

fn matches_sites<T: Element>(sites: &Arc<CoordinateSet>, input: &SparseConvTensor<T>) -> bool {
    Arc::ptr_eq(sites, input.sites()) || sites.same_sites(input.sites())
}

fn check_rulebook_input<T: Element>(input: &SparseConvTensor<T>, rulebook: &Rulebook) -> Result<()> {
    if !matches_sites(rulebook.input_sites(), input) {
        return Err(Error::integrity(format!(
            "rulebook input has {} sites, tensor has {} different ones",
            rulebook.input_sites().len(),
            input.num_active()
        )));
    }
    Ok(())
}
