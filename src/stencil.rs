//! The callable stencil object.
//!
//! A [`Stencil`] is an immutable handle on one compiled artifact. Calling
//! it binds names to storages and scalars, checks the bindings against the
//! signature and every field against its halo, syncs storages to the side
//! the backend runs on, and launches the kernel over
//! `[origin, origin + domain)`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::analysis::{AnalyzedStencil, FieldInfo};
use crate::backend::{Backend, CompiledArtifact, FieldArg, Launch};
use crate::error::{
    Bound, Error, OutOfBoundsError, Result, SignatureMismatchError, StorageError,
};
use crate::ir::{DType, ParamKind};
use crate::storage::{Element, FieldStorage, Storage};

// ─── Arguments ─────────────────────────────────────────────────────

/// A scalar argument with its element type.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScalarValue {
    F32(f32),
    F64(f64),
}

impl ScalarValue {
    pub fn dtype(&self) -> DType {
        match self {
            ScalarValue::F32(_) => DType::F32,
            ScalarValue::F64(_) => DType::F64,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            ScalarValue::F32(v) => v as f64,
            ScalarValue::F64(v) => v,
        }
    }
}

impl From<f32> for ScalarValue {
    fn from(v: f32) -> Self {
        ScalarValue::F32(v)
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        ScalarValue::F64(v)
    }
}

/// Named arguments of one call.
///
/// Fields are borrowed mutably, so one storage can never be bound to two
/// parameters of the same call.
#[derive(Default)]
pub struct Bindings<'a> {
    fields: Vec<(String, &'a mut dyn FieldStorage)>,
    scalars: Vec<(String, ScalarValue)>,
}

impl<'a> Bindings<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, storage: &'a mut dyn FieldStorage) -> Self {
        self.fields.push((name.into(), storage));
        self
    }

    pub fn scalar(mut self, name: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.scalars.push((name.into(), value.into()));
        self
    }
}

impl fmt::Debug for Bindings<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bindings")
            .field("fields", &self.fields.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("scalars", &self.scalars)
            .finish()
    }
}

/// Where the computed region starts in each storage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Origin {
    /// `None`: use each storage's own alignment origin.
    default: Option<[usize; 3]>,
    per_field: BTreeMap<String, [usize; 3]>,
}

impl Origin {
    /// Use each storage's alignment origin.
    pub fn storage() -> Self {
        Self::default()
    }

    /// The same origin for every field.
    pub fn uniform(origin: [usize; 3]) -> Self {
        Self {
            default: Some(origin),
            per_field: BTreeMap::new(),
        }
    }

    /// Override the origin of one field.
    pub fn with_field(mut self, name: impl Into<String>, origin: [usize; 3]) -> Self {
        self.per_field.insert(name.into(), origin);
        self
    }

    fn resolve(&self, name: &str, storage: &dyn FieldStorage) -> [usize; 3] {
        self.per_field
            .get(name)
            .copied()
            .or(self.default)
            .unwrap_or_else(|| storage.origin())
    }
}

/// Per-call options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub origin: Origin,
    /// `None`: the largest domain valid for every field.
    pub domain: Option<[usize; 3]>,
    pub validate_args: bool,
}

impl Default for Invocation {
    fn default() -> Self {
        Self {
            origin: Origin::storage(),
            domain: None,
            validate_args: true,
        }
    }
}

impl Invocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn domain(mut self, domain: [usize; 3]) -> Self {
        self.domain = Some(domain);
        self
    }

    /// Skip the checks a correct caller does not need: unknown arguments,
    /// unknown origin overrides and scalar dtypes. Field dtypes and bounds
    /// are always checked since kernels index raw memory.
    pub fn validate_args(mut self, validate: bool) -> Self {
        self.validate_args = validate;
        self
    }
}

/// What a call did.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExecInfo {
    pub backend: Backend,
    pub domain: [usize; 3],
    /// Resolved origin of each field, declaration order.
    pub origins: Vec<(String, [usize; 3])>,
    pub elapsed: Duration,
}

// ─── Stencil ───────────────────────────────────────────────────────

/// A compiled stencil. Cheap to clone; clones share the artifact.
#[derive(Clone, Debug)]
pub struct Stencil {
    artifact: Arc<CompiledArtifact>,
}

impl Stencil {
    pub(crate) fn new(artifact: Arc<CompiledArtifact>) -> Self {
        Self { artifact }
    }

    pub fn name(&self) -> &str {
        self.analyzed().name()
    }

    pub fn backend(&self) -> Backend {
        self.artifact.backend
    }

    pub fn analyzed(&self) -> &AnalyzedStencil {
        &self.artifact.stencil
    }

    /// Field parameters with their halo and access intent.
    pub fn fields(&self) -> &[FieldInfo] {
        &self.analyzed().fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.analyzed().field(name)
    }

    pub fn source(&self) -> &str {
        &self.artifact.source
    }

    pub fn source_path(&self) -> &Path {
        &self.artifact.source_path
    }

    pub fn artifact(&self) -> &CompiledArtifact {
        &self.artifact
    }

    /// Allocate a zeroed storage suited to this stencil's backend.
    pub fn zeros<T: Element>(&self, shape: [usize; 3], origin: [usize; 3]) -> Result<Storage<T>> {
        Ok(Storage::zeros(self.backend(), shape, origin)?)
    }

    /// Call with every default: storage origins and the largest domain.
    pub fn run(&self, bindings: Bindings<'_>) -> Result<ExecInfo> {
        self.invoke(bindings, &Invocation::default())
    }

    pub fn invoke(&self, bindings: Bindings<'_>, call: &Invocation) -> Result<ExecInfo> {
        let analyzed = self.analyzed();
        let backend = self.backend();
        let _span =
            tracing::debug_span!("invoke", stencil = analyzed.name(), %backend).entered();

        let Bindings { fields, scalars } = bindings;
        let (mut fields, scalars) = self.match_signature(fields, scalars, call)?;

        let origins: Vec<[usize; 3]> = fields
            .iter()
            .zip(&analyzed.fields)
            .map(|(storage, info)| call.origin.resolve(&info.name, &**storage))
            .collect();
        let domain = match call.domain {
            Some(domain) => domain,
            None => largest_domain(&analyzed.fields, &fields, &origins),
        };
        check_bounds(&analyzed.fields, &fields, &origins, domain)?;

        for (storage, info) in fields.iter_mut().zip(&analyzed.fields) {
            if backend.is_device() {
                if !storage.has_device() {
                    return Err(StorageError::DeviceUnavailable(format!(
                        "field '{}' has no device copy; allocate it for the {} backend",
                        info.name, backend
                    ))
                    .into());
                }
                storage.sync_device()?;
            } else {
                storage.sync_host()?;
            }
        }

        let mut launch = Launch {
            fields: fields
                .iter_mut()
                .zip(&origins)
                .map(|(storage, &origin)| FieldArg {
                    storage: &mut **storage,
                    origin,
                })
                .collect(),
            scalars,
            domain,
        };

        let started = Instant::now();
        self.artifact.kernel.launch(&mut launch)?;
        let elapsed = started.elapsed();
        drop(launch);

        for (storage, info) in fields.iter_mut().zip(&analyzed.fields) {
            if info.intent.is_written() {
                if backend.is_device() {
                    storage.mark_device_written();
                } else {
                    storage.mark_host_written();
                }
            }
        }

        tracing::debug!(?domain, elapsed_us = elapsed.as_micros() as u64, "stencil ran");
        Ok(ExecInfo {
            backend,
            domain,
            origins: analyzed
                .fields
                .iter()
                .map(|f| f.name.clone())
                .zip(origins)
                .collect(),
            elapsed,
        })
    }

    /// Order bindings by declaration and check names, kinds and dtypes.
    #[allow(clippy::type_complexity)]
    fn match_signature<'a>(
        &self,
        fields: Vec<(String, &'a mut dyn FieldStorage)>,
        scalars: Vec<(String, ScalarValue)>,
        call: &Invocation,
    ) -> Result<(Vec<&'a mut dyn FieldStorage>, Vec<f64>)> {
        let definition = &self.analyzed().definition;
        let mut seen = BTreeSet::new();

        let mut bound_fields: BTreeMap<String, &'a mut dyn FieldStorage> = BTreeMap::new();
        for (name, storage) in fields {
            if !seen.insert(name.clone()) {
                return Err(SignatureMismatchError::DuplicateArgument(name).into());
            }
            match definition.param(&name) {
                Some(p) if p.kind == ParamKind::Scalar => {
                    return Err(SignatureMismatchError::WrongKind {
                        name,
                        expected: ParamKind::Scalar,
                    }
                    .into())
                }
                Some(_) => {
                    bound_fields.insert(name, storage);
                }
                None if call.validate_args => {
                    return Err(SignatureMismatchError::UnknownArgument(name).into())
                }
                None => {}
            }
        }

        let mut bound_scalars: BTreeMap<String, ScalarValue> = BTreeMap::new();
        for (name, value) in scalars {
            if !seen.insert(name.clone()) {
                return Err(SignatureMismatchError::DuplicateArgument(name).into());
            }
            match definition.param(&name) {
                Some(p) if p.kind == ParamKind::Field => {
                    return Err(SignatureMismatchError::WrongKind {
                        name,
                        expected: ParamKind::Field,
                    }
                    .into())
                }
                Some(_) => {
                    bound_scalars.insert(name, value);
                }
                None if call.validate_args => {
                    return Err(SignatureMismatchError::UnknownArgument(name).into())
                }
                None => {}
            }
        }

        if call.validate_args {
            for name in call.origin.per_field.keys() {
                if self.field(name).is_none() {
                    return Err(SignatureMismatchError::UnknownOrigin(name.clone()).into());
                }
            }
        }

        let mut ordered = Vec::with_capacity(self.fields().len());
        for info in self.fields() {
            let storage = bound_fields
                .remove(&info.name)
                .ok_or_else(|| SignatureMismatchError::MissingField(info.name.clone()))?;
            if storage.dtype() != info.dtype {
                return Err(SignatureMismatchError::WrongDType {
                    name: info.name.clone(),
                    expected: info.dtype,
                    found: storage.dtype(),
                }
                .into());
            }
            ordered.push(storage);
        }

        let mut values = Vec::new();
        for param in definition.scalars() {
            let value = bound_scalars
                .get(&param.name)
                .ok_or_else(|| SignatureMismatchError::MissingScalar(param.name.clone()))?;
            if call.validate_args && value.dtype() != param.dtype {
                return Err(SignatureMismatchError::WrongDType {
                    name: param.name.clone(),
                    expected: param.dtype,
                    found: value.dtype(),
                }
                .into());
            }
            values.push(value.as_f64());
        }
        Ok((ordered, values))
    }
}

/// Largest domain that keeps every accessed field and its halo in bounds.
fn largest_domain(
    infos: &[FieldInfo],
    fields: &[&mut dyn FieldStorage],
    origins: &[[usize; 3]],
) -> [usize; 3] {
    let mut domain = [usize::MAX; 3];
    for ((info, storage), origin) in infos.iter().zip(fields).zip(origins) {
        if info.intent == crate::analysis::AccessIntent::Unused {
            continue;
        }
        let shape = storage.shape();
        for axis in 0..3 {
            let room = shape[axis].saturating_sub(origin[axis].saturating_add(info.halo.upper[axis]));
            domain[axis] = domain[axis].min(room);
        }
    }
    domain.map(|n| if n == usize::MAX { 0 } else { n })
}

/// Check origin, domain and halo against every accessed field before
/// anything runs.
fn check_bounds(
    infos: &[FieldInfo],
    fields: &[&mut dyn FieldStorage],
    origins: &[[usize; 3]],
    domain: [usize; 3],
) -> Result<(), Error> {
    for ((info, storage), origin) in infos.iter().zip(fields).zip(origins) {
        if info.intent == crate::analysis::AccessIntent::Unused {
            continue;
        }
        let shape = storage.shape();
        for axis in 0..3 {
            let lower = info.halo.lower[axis];
            if origin[axis] < lower {
                return Err(OutOfBoundsError {
                    field: info.name.clone(),
                    axis,
                    bound: Bound::Lower,
                    required: lower as i64,
                    available: origin[axis] as i64,
                }
                .into());
            }
            // None when the request does not even fit in a usize.
            let end = origin[axis]
                .checked_add(domain[axis])
                .and_then(|n| n.checked_add(info.halo.upper[axis]));
            if end.map_or(true, |end| end > shape[axis]) {
                return Err(OutOfBoundsError {
                    field: info.name.clone(),
                    axis,
                    bound: Bound::Upper,
                    required: end.and_then(|end| i64::try_from(end).ok()).unwrap_or(i64::MAX),
                    available: shape[axis] as i64,
                }
                .into());
            }
        }
    }
    Ok(())
}
