use crate::codec::{self, QueryParams};
use crate::config::{EngineConfig, MatchReplaceRule, RunOptions};
use crate::error::{CodecError, JobError};
use crate::input::InputUrl;

/// Callback receiving each fully materialized URL string.
///
/// Returning an error stops the mutator; it is how a closed output channel
/// reaches the job.
pub type Emit<'e> = dyn FnMut(String) -> Result<(), JobError> + 'e;

/// A `Mutator` turns one URL into its fuzzing candidates.
///
/// Implementations alter exactly one parameter value per emitted URL and must
/// leave `params` exactly as they found it once `mutate` returns, including
/// when `emit` fails.
pub trait Mutator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Mutates `params` one slot at a time and hands every variant to `emit`.
    ///
    /// # Arguments
    /// * `target`: The URL being mutated. Supplies everything outside the query
    ///   when variants are rendered, and identifies the job in log lines.
    /// * `params`: The job's own decoded copy of `target`'s query. Each slot is
    ///   overwritten, rendered, then restored before the next one.
    /// * `emit`: Receives every rendered URL, in slot order.
    ///
    /// # Returns
    /// `Result<(), JobError>`:
    ///   - `Ok(())`: Every variant was handed to `emit`. Slots a strategy skips
    ///     (such as unmatched values) simply produce nothing.
    ///   - `Err(error)`: `emit` failed, typically with `JobError::OutputClosed`.
    ///     `params` is restored all the same.
    fn mutate(
        &self,
        target: &InputUrl,
        params: &mut QueryParams,
        emit: &mut Emit<'_>,
    ) -> Result<(), JobError>;
}

/// Renders the current state of `params` as a full URL.
fn materialize_current(target: &InputUrl, params: &QueryParams, options: &RunOptions) -> String {
    let rendered = codec::render_query(params, options.decoded_params);
    target.with_query(&query_or_encoded(rendered, target, params, options))
}

/// Falls back to the encoded form when rendering failed.
///
/// Decoding the output of [`codec::encode`] cannot fail today, so this only
/// guards against a future encoder change. Worth a log line in debug mode only.
fn query_or_encoded(
    rendered: Result<String, CodecError>,
    target: &InputUrl,
    params: &QueryParams,
    options: &RunOptions,
) -> String {
    match rendered {
        Ok(query) => query,
        Err(e) => {
            if options.debug {
                tracing::warn!(url = %target, error = %e, "Error decoding parameters, emitting encoded form");
            }
            codec::encode(params)
        }
    }
}

/// Substitutes one value, emits, and restores the original even on failure.
fn emit_with(
    target: &InputUrl,
    params: &mut QueryParams,
    options: &RunOptions,
    (name, index): (&str, usize),
    value: String,
    emit: &mut Emit<'_>,
) -> Result<(), JobError> {
    let Some(original) = params.set(name, index, value) else {
        return Ok(());
    };
    let rendered = materialize_current(target, params, options);
    params.set(name, index, original);
    emit(rendered)
}

/// Replaces (or appends to) every value with every literal payload.
#[derive(Debug, Clone, Copy)]
pub struct InjectionListMutator<'a> {
    injections: &'a [String],
    options: &'a RunOptions,
}

impl<'a> InjectionListMutator<'a> {
    pub fn new(injections: &'a [String], options: &'a RunOptions) -> Self {
        Self {
            injections,
            options,
        }
    }
}

impl Mutator for InjectionListMutator<'_> {
    fn name(&self) -> &'static str {
        "injection-list"
    }

    fn mutate(
        &self,
        target: &InputUrl,
        params: &mut QueryParams,
        emit: &mut Emit<'_>,
    ) -> Result<(), JobError> {
        let slots = params.slots();
        for injection in self.injections {
            let injection = injection.trim();
            for (name, index) in &slots {
                let Some(original) = params.get(name, *index) else {
                    continue;
                };
                let value = if self.options.append_mode {
                    format!("{original}{injection}")
                } else {
                    injection.to_string()
                };
                emit_with(target, params, self.options, (name.as_str(), *index), value, emit)?;
            }
        }
        Ok(())
    }
}

/// Applies each match/replace rule to every value, one rule at a time.
#[derive(Debug, Clone, Copy)]
pub struct RegexReplaceMutator<'a> {
    rules: &'a [MatchReplaceRule],
    options: &'a RunOptions,
}

impl<'a> RegexReplaceMutator<'a> {
    pub fn new(rules: &'a [MatchReplaceRule], options: &'a RunOptions) -> Self {
        Self { rules, options }
    }

    /// The value to emit for `original` under `rule`, or `None` when the rule
    /// made no change and unaltered URLs are not wanted.
    ///
    /// Appending only happens on a real change, so forcing emission of an
    /// unaltered value never doubles it.
    pub fn replacement_for(&self, rule: &MatchReplaceRule, original: &str) -> Option<String> {
        let replaced = rule.apply(original);
        let changed = replaced != original;
        if !changed && !self.options.include_unaltered {
            return None;
        }
        if changed && (self.options.append_mode || rule.append) {
            Some(format!("{original}{replaced}"))
        } else {
            Some(replaced)
        }
    }
}

impl Mutator for RegexReplaceMutator<'_> {
    fn name(&self) -> &'static str {
        "regex-replace"
    }

    fn mutate(
        &self,
        target: &InputUrl,
        params: &mut QueryParams,
        emit: &mut Emit<'_>,
    ) -> Result<(), JobError> {
        let slots = params.slots();
        for rule in self.rules {
            for (name, index) in &slots {
                let Some(original) = params.get(name, *index) else {
                    continue;
                };
                let Some(value) = self.replacement_for(rule, original) else {
                    continue;
                };
                emit_with(target, params, self.options, (name.as_str(), *index), value, emit)?;
            }
        }
        Ok(())
    }
}

/// The mutation strategy for a whole run, fixed once from configuration.
#[derive(Debug, Clone, Copy)]
pub enum Strategy<'a> {
    InjectionList(InjectionListMutator<'a>),
    RegexReplace(RegexReplaceMutator<'a>),
}

impl<'a> Strategy<'a> {
    pub fn from_config(config: &'a EngineConfig) -> Self {
        if config.uses_regex_rules() {
            Strategy::RegexReplace(RegexReplaceMutator::new(&config.rules, &config.options))
        } else {
            Strategy::InjectionList(InjectionListMutator::new(
                &config.injections,
                &config.options,
            ))
        }
    }
}

impl Mutator for Strategy<'_> {
    fn name(&self) -> &'static str {
        match self {
            Strategy::InjectionList(m) => m.name(),
            Strategy::RegexReplace(m) => m.name(),
        }
    }

    fn mutate(
        &self,
        target: &InputUrl,
        params: &mut QueryParams,
        emit: &mut Emit<'_>,
    ) -> Result<(), JobError> {
        match self {
            Strategy::InjectionList(m) => m.mutate(target, params, emit),
            Strategy::RegexReplace(m) => m.mutate(target, params, emit),
        }
    }
}
