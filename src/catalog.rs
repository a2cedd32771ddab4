use crate::api::Backend;
use crate::log_warn;
use crate::types::{ExternalState, Phase};

/// Fetch the ordered phase catalog. Fails open to an empty catalog on
/// transport error: the caller gets a usable (if empty) engine and the
/// failure is reported, not fatal.
pub async fn load_phases(backend: &impl Backend) -> Vec<Phase> {
    match backend.list_phases().await {
        Ok(phases) => phases,
        Err(e) => {
            log_warn!("Warning: could not load phase catalog: {}", e);
            Vec::new()
        }
    }
}

/// Resolve which catalog index is active for a product, given the display
/// name of its current external state.
///
/// Best-effort heuristic: matches the state name against phase code (exact),
/// phase name (substring, either direction), or phase id rendered as text.
/// Ambiguity is resolved by first match in catalog order; no match or no
/// state name defaults to the first phase.
pub fn resolve_active_phase(phases: &[Phase], state_name: Option<&str>) -> usize {
    let Some(state_name) = state_name else {
        return 0;
    };
    let needle = state_name.trim().to_lowercase();
    if needle.is_empty() {
        return 0;
    }

    phases
        .iter()
        .position(|phase| {
            if let Some(code) = &phase.code {
                if code.to_lowercase() == needle {
                    return true;
                }
            }
            if let Some(name) = &phase.name {
                let name = name.to_lowercase();
                if name.contains(&needle) || needle.contains(&name) {
                    return true;
                }
            }
            phase.id.to_string() == needle
        })
        .unwrap_or(0)
}

/// Find the external state that corresponds to `phase`.
///
/// Precedence, each pass over all states in order:
/// 1. exact code match (phase code against state code or state name)
/// 2. exact name match
/// 3. id equality
/// 4. substring name match (either direction)
///
/// Returns `None` when nothing matches; the caller must fail closed and
/// leave the product's state untouched.
pub fn match_external_state<'a>(
    states: &'a [ExternalState],
    phase: &Phase,
) -> Option<&'a ExternalState> {
    let code = phase.code.as_ref().map(|c| c.to_lowercase());
    let name = phase.name.as_ref().map(|n| n.to_lowercase());

    if let Some(code) = &code {
        if let Some(state) = states.iter().find(|s| {
            s.code.as_ref().is_some_and(|c| c.to_lowercase() == *code)
                || s.name.to_lowercase() == *code
        }) {
            return Some(state);
        }
    }

    if let Some(name) = &name {
        if let Some(state) = states.iter().find(|s| s.name.to_lowercase() == *name) {
            return Some(state);
        }
    }

    if let Some(state) = states.iter().find(|s| s.id == phase.id) {
        return Some(state);
    }

    if let Some(name) = &name {
        if let Some(state) = states.iter().find(|s| {
            let state_name = s.name.to_lowercase();
            state_name.contains(name) || name.contains(&state_name)
        }) {
            return Some(state);
        }
    }

    None
}
