use weft_vdom::Modifiers;

use crate::compiler::{CondKind, DynAttrAcc, NodeAcc};
use crate::error::CompileError;

/// How a directive claims attribute names.
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) enum MatchKind {
    Exact,
    /// The attribute name continues after the directive name
    /// (`t-att-class`, `t-on-click`)
    Prefix,
}

/// A directive record. The registry is sorted by `priority` once at
/// construction; a node's matched directives are applied in that order.
pub(crate) struct Directive {
    pub(crate) name: &'static str,
    pub(crate) priority: u8,
    pub(crate) kind: MatchKind,
    pub(crate) apply: fn(&mut NodeAcc, &DirectiveUse<'_>) -> Result<(), CompileError>,
}

pub(crate) struct DirectiveUse<'a> {
    /// The trailing part of a prefix-matched attribute name
    pub(crate) arg: Option<&'a str>,
    pub(crate) value: &'a str,
}

/// The built-in directive set, sorted by priority.
pub(crate) fn default_directives() -> Vec<Directive> {
    let mut directives = vec![
        directive("t-name", 1, MatchKind::Exact, apply_name),
        directive("t-foreach", 10, MatchKind::Exact, apply_foreach),
        directive("t-as", 11, MatchKind::Exact, apply_as),
        directive("t-key", 12, MatchKind::Exact, apply_key),
        directive("t-if", 20, MatchKind::Exact, apply_if),
        directive("t-elif", 21, MatchKind::Exact, apply_elif),
        directive("t-else", 22, MatchKind::Exact, apply_else),
        directive("t-call", 30, MatchKind::Exact, apply_call),
        directive("t-set", 40, MatchKind::Exact, apply_set),
        directive("t-value", 41, MatchKind::Exact, apply_value),
        directive("t-esc", 50, MatchKind::Exact, apply_esc),
        directive("t-raw", 51, MatchKind::Exact, apply_raw),
        directive("t-att-", 60, MatchKind::Prefix, apply_att_value),
        directive("t-attf-", 61, MatchKind::Prefix, apply_att_format),
        directive("t-att", 62, MatchKind::Exact, apply_att_spread),
        directive("t-attf", 63, MatchKind::Exact, apply_attf_bare),
        directive("t-on-", 70, MatchKind::Prefix, apply_on),
        directive("t-on", 71, MatchKind::Exact, apply_on_bare),
        directive("t-ref", 80, MatchKind::Exact, apply_ref),
        directive("t-widget", 90, MatchKind::Exact, apply_widget),
        directive("t-transition", 100, MatchKind::Exact, apply_transition),
        directive("t-debug", 110, MatchKind::Exact, apply_debug),
        directive("t-log", 111, MatchKind::Exact, apply_log),
    ];
    directives.sort_by_key(|directive| directive.priority);
    directives
}

fn directive(
    name: &'static str,
    priority: u8,
    kind: MatchKind,
    apply: fn(&mut NodeAcc, &DirectiveUse<'_>) -> Result<(), CompileError>,
) -> Directive {
    Directive {
        name,
        priority,
        kind,
        apply,
    }
}

/// Resolve an attribute name against the registry. Prefer the longest
/// directive name so `t-attf-x` is not claimed by `t-att-`.
pub(crate) fn find<'d>(directives: &'d [Directive], attr: &str) -> Option<(&'d Directive, Option<String>)> {
    let mut best: Option<&Directive> = None;
    for directive in directives {
        let matches = match directive.kind {
            MatchKind::Exact => attr == directive.name,
            MatchKind::Prefix => attr.starts_with(directive.name),
        };
        if matches && best.is_none_or(|b| directive.name.len() > b.name.len()) {
            best = Some(directive);
        }
    }
    let directive = best?;
    let arg = match directive.kind {
        MatchKind::Exact => None,
        MatchKind::Prefix => Some(attr[directive.name.len()..].to_string()),
    };
    Some((directive, arg))
}

// -----------------------------------------------------------------------------
//   - Apply -
// -----------------------------------------------------------------------------
fn apply_name(_acc: &mut NodeAcc, _use: &DirectiveUse<'_>) -> Result<(), CompileError> {
    // consumed at registration time
    Ok(())
}

fn apply_foreach(acc: &mut NodeAcc, use_: &DirectiveUse<'_>) -> Result<(), CompileError> {
    acc.foreach = Some(use_.value.to_string());
    Ok(())
}

fn apply_as(acc: &mut NodeAcc, use_: &DirectiveUse<'_>) -> Result<(), CompileError> {
    acc.binding = Some(use_.value.to_string());
    Ok(())
}

fn apply_key(acc: &mut NodeAcc, use_: &DirectiveUse<'_>) -> Result<(), CompileError> {
    acc.key = Some(use_.value.to_string());
    Ok(())
}

fn apply_if(acc: &mut NodeAcc, use_: &DirectiveUse<'_>) -> Result<(), CompileError> {
    acc.cond = Some(CondKind::If(use_.value.to_string()));
    Ok(())
}

fn apply_elif(acc: &mut NodeAcc, use_: &DirectiveUse<'_>) -> Result<(), CompileError> {
    acc.cond = Some(CondKind::Elif(use_.value.to_string()));
    Ok(())
}

fn apply_else(acc: &mut NodeAcc, _use: &DirectiveUse<'_>) -> Result<(), CompileError> {
    acc.cond = Some(CondKind::Else);
    Ok(())
}

fn apply_call(acc: &mut NodeAcc, use_: &DirectiveUse<'_>) -> Result<(), CompileError> {
    acc.call = Some(use_.value.to_string());
    Ok(())
}

fn apply_set(acc: &mut NodeAcc, use_: &DirectiveUse<'_>) -> Result<(), CompileError> {
    acc.set_name = Some(use_.value.to_string());
    Ok(())
}

fn apply_value(acc: &mut NodeAcc, use_: &DirectiveUse<'_>) -> Result<(), CompileError> {
    acc.set_value = Some(use_.value.to_string());
    Ok(())
}

fn apply_esc(acc: &mut NodeAcc, use_: &DirectiveUse<'_>) -> Result<(), CompileError> {
    acc.esc = Some(use_.value.to_string());
    Ok(())
}

fn apply_raw(acc: &mut NodeAcc, use_: &DirectiveUse<'_>) -> Result<(), CompileError> {
    acc.raw = Some(use_.value.to_string());
    Ok(())
}

fn apply_att_value(acc: &mut NodeAcc, use_: &DirectiveUse<'_>) -> Result<(), CompileError> {
    let Some(name) = use_.arg.filter(|arg| !arg.is_empty()) else {
        return Err(CompileError::MissingAttributeName);
    };
    acc.dyn_attrs.push(DynAttrAcc::Value {
        name: name.to_string(),
        src: use_.value.to_string(),
    });
    Ok(())
}

fn apply_att_format(acc: &mut NodeAcc, use_: &DirectiveUse<'_>) -> Result<(), CompileError> {
    let Some(name) = use_.arg.filter(|arg| !arg.is_empty()) else {
        return Err(CompileError::MissingAttributeName);
    };
    acc.dyn_attrs.push(DynAttrAcc::Format {
        name: name.to_string(),
        src: use_.value.to_string(),
    });
    Ok(())
}

fn apply_att_spread(acc: &mut NodeAcc, use_: &DirectiveUse<'_>) -> Result<(), CompileError> {
    acc.dyn_attrs.push(DynAttrAcc::Spread {
        src: use_.value.to_string(),
    });
    Ok(())
}

fn apply_attf_bare(_acc: &mut NodeAcc, _use: &DirectiveUse<'_>) -> Result<(), CompileError> {
    Err(CompileError::MissingAttributeName)
}

fn apply_on(acc: &mut NodeAcc, use_: &DirectiveUse<'_>) -> Result<(), CompileError> {
    let arg = use_.arg.unwrap_or("");
    let mut parts = arg.split('.');
    let event = parts.next().unwrap_or("");
    if event.is_empty() {
        return Err(CompileError::MissingEventName);
    }

    let mut mods = Modifiers::empty();
    for part in parts {
        match Modifiers::from_modifier_name(part) {
            Some(modifier) => mods |= modifier,
            None => return Err(CompileError::UnknownModifier(part.to_string())),
        }
    }

    acc.listeners.push((event.to_string(), mods, use_.value.to_string()));
    Ok(())
}

fn apply_on_bare(_acc: &mut NodeAcc, _use: &DirectiveUse<'_>) -> Result<(), CompileError> {
    Err(CompileError::MissingEventName)
}

fn apply_ref(acc: &mut NodeAcc, use_: &DirectiveUse<'_>) -> Result<(), CompileError> {
    acc.ref_expr = Some(use_.value.to_string());
    Ok(())
}

fn apply_widget(acc: &mut NodeAcc, use_: &DirectiveUse<'_>) -> Result<(), CompileError> {
    acc.widget = Some(use_.value.to_string());
    Ok(())
}

fn apply_transition(acc: &mut NodeAcc, use_: &DirectiveUse<'_>) -> Result<(), CompileError> {
    acc.transition = Some(use_.value.to_string());
    Ok(())
}

fn apply_debug(acc: &mut NodeAcc, _use: &DirectiveUse<'_>) -> Result<(), CompileError> {
    acc.debug = true;
    Ok(())
}

fn apply_log(acc: &mut NodeAcc, use_: &DirectiveUse<'_>) -> Result<(), CompileError> {
    acc.log = Some(use_.value.to_string());
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn longest_directive_name_wins() {
        let directives = default_directives();

        let (d, arg) = find(&directives, "t-att-class").unwrap();
        assert_eq!(d.name, "t-att-");
        assert_eq!(arg.as_deref(), Some("class"));

        let (d, arg) = find(&directives, "t-attf-style").unwrap();
        assert_eq!(d.name, "t-attf-");
        assert_eq!(arg.as_deref(), Some("style"));

        let (d, arg) = find(&directives, "t-att").unwrap();
        assert_eq!(d.name, "t-att");
        assert_eq!(arg, None);
    }

    #[test]
    fn unknown_directive_is_not_found() {
        let directives = default_directives();
        assert!(find(&directives, "t-nope").is_none());
    }

    #[test]
    fn registry_is_priority_sorted() {
        let directives = default_directives();
        let priorities = directives.iter().map(|d| d.priority).collect::<Vec<_>>();
        let mut sorted = priorities.clone();
        sorted.sort_unstable();
        assert_eq!(priorities, sorted);
    }

    #[test]
    fn event_modifiers() {
        let mut acc = NodeAcc::default();
        let use_ = DirectiveUse {
            arg: Some("click.stop.prevent"),
            value: "inc",
        };
        apply_on(&mut acc, &use_).unwrap();

        let (event, mods, value) = &acc.listeners[0];
        assert_eq!(event, "click");
        assert!(mods.contains(Modifiers::STOP));
        assert!(mods.contains(Modifiers::PREVENT));
        assert_eq!(value, "inc");
    }

    #[test]
    fn missing_event_name() {
        let mut acc = NodeAcc::default();
        let use_ = DirectiveUse { arg: Some(""), value: "x" };
        assert_eq!(apply_on(&mut acc, &use_), Err(CompileError::MissingEventName));
    }

    #[test]
    fn unknown_modifier() {
        let mut acc = NodeAcc::default();
        let use_ = DirectiveUse {
            arg: Some("click.bogus"),
            value: "x",
        };
        assert_eq!(
            apply_on(&mut acc, &use_),
            Err(CompileError::UnknownModifier("bogus".into()))
        );
    }
}
