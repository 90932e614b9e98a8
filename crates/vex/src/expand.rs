//! the expansion engine
//!
//! Scalars are whitespace-collapsed, scanned for `$[...]` references and
//! expanded recursively; blocks are expanded line by line (or flattened to
//! one scalar when referenced in scalar context). Cycle detection rides on
//! an explicit stack of in-progress key names threaded through every
//! recursive call and checked before each descent, so authoring mistakes
//! fail with a readable chain instead of blowing the call stack.
use crate::collection::Collection;
use crate::error::{Error, Result};
use crate::value::Value;

/// Per-call expansion overrides
///
/// `lax` propagates into every nested expansion of the call, exactly like a
/// `:lax` reference modifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpandOptions {
    /// Treat unresolved references as empty instead of failing
    pub lax: bool,
}

impl Collection {
    /// Fully expanded scalar value of `name`
    ///
    /// A trailing `?` turns the lookup into a boolean query answering
    /// `"yes"`/`"no"`. Block values flatten to a single line. A scalar
    /// consisting of a zapped reference expands to the empty string.
    pub fn lookup(&self, name: &str) -> Result<String> {
        self.lookup_with(name, ExpandOptions::default())
    }

    pub fn lookup_with(&self, name: &str, opts: ExpandOptions) -> Result<String> {
        if let Some(base) = name.strip_suffix('?') {
            let answer = if self.truthy(base)? { "yes" } else { "no" };
            return Ok(answer.to_string());
        }

        match self.resolve_entry(name)? {
            Some(value) => Ok(self
                .expand_value(value, Some(name), &[], opts)?
                .unwrap_or_default()),
            None if opts.lax => {
                self.record_blank(name);
                Ok(String::new())
            }
            None => Err(Error::Undefined {
                name: name.to_string(),
                stack: vec![],
            }),
        }
    }

    /// Each line of a block-valued key, independently expanded; lines whose
    /// `:zap` reference failed are omitted
    pub fn lookup_multi(&self, name: &str) -> Result<Vec<String>> {
        self.lookup_multi_with(name, ExpandOptions::default())
    }

    pub fn lookup_multi_with(&self, name: &str, opts: ExpandOptions) -> Result<Vec<String>> {
        self.expand_multi(name, &[], opts)
    }

    /// Shape-preserving resolution: scalars expand to a scalar, blocks to
    /// their expanded lines
    pub fn resolve(&self, name: &str) -> Result<Value> {
        self.resolve_with(name, ExpandOptions::default())
    }

    pub fn resolve_with(&self, name: &str, opts: ExpandOptions) -> Result<Value> {
        if name.ends_with('?') {
            return Ok(Value::Scalar(self.lookup_with(name, opts)?));
        }
        match self.resolve_entry(name)? {
            Some(Value::Block(_)) => Ok(Value::Block(self.expand_multi(name, &[], opts)?)),
            _ => Ok(Value::Scalar(self.lookup_with(name, opts)?)),
        }
    }

    /// Boolean truth of a name: resolvable and non-blank. The resolved
    /// variant is tested without expanding references; blocks always count
    /// as truthy.
    fn truthy(&self, name: &str) -> Result<bool> {
        Ok(match self.resolve_entry(name)? {
            Some(Value::Scalar(text)) => !collapse(text).is_empty(),
            Some(Value::Block(_)) => true,
            None => false,
        })
    }

    /// Expand a stored value in scalar context; blocks flatten to one line
    pub(crate) fn expand_value(
        &self,
        value: &Value,
        owner: Option<&str>,
        stack: &[String],
        opts: ExpandOptions,
    ) -> Result<Option<String>> {
        match value {
            Value::Scalar(text) => self.expand_text(text, owner, stack, opts),
            Value::Block(lines) => {
                let flat = lines
                    .iter()
                    .map(|line| collapse(line))
                    .collect::<Vec<_>>()
                    .join(" ");
                self.expand_text(&flat, owner, stack, opts)
            }
        }
    }

    /// Scan one scalar for references and expand them
    ///
    /// Returns `None` when a `:zap` reference failed (or expanded empty):
    /// the entire line is discarded. `owner` is the key whose value is
    /// being expanded; it anchors the section shorthand, declaration-time
    /// laxness, and the cycle stack.
    pub(crate) fn expand_text(
        &self,
        text: &str,
        owner: Option<&str>,
        stack: &[String],
        opts: ExpandOptions,
    ) -> Result<Option<String>> {
        let flat = collapse(text);

        // `<< path` aliases the trimmed contents of a file
        let words: Vec<&str> = flat.split(' ').collect();
        let (body, from_file) = if words.len() == 2 && words[0] == "<<" {
            (words[1].to_string(), true)
        } else {
            (flat, false)
        };

        let mut out = String::new();
        let mut rest = body.as_str();
        while let Some(start) = rest.find("$[") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];

            // `$[[...]]` is reserved for the nested multi-line form and
            // passes through verbatim at scalar granularity
            if let Some(after) = after.strip_prefix('[') {
                out.push_str("$[[");
                rest = after;
                continue;
            }

            let Some(end) = after.find(']') else {
                return Err(Error::MalformedReference {
                    value: body.clone(),
                    reason: "unterminated \"$[\"".to_string(),
                });
            };
            let mut name = &after[..end];
            rest = &after[end + 1..];

            let boolean = name.ends_with('?');
            if boolean {
                name = &name[..name.len() - 1];
            }

            // the section shorthands substitute names, not values:
            // `$[]`/`$[:]` the enclosing section, `$[:suffix]` section/suffix
            if name.is_empty() || name == ":" {
                out.push_str(&self.section_of(owner, &body)?);
                continue;
            }
            if let Some(suffix) = name.strip_prefix(':') {
                let section = self.section_of(owner, &body)?;
                out.push_str(&section);
                out.push('/');
                out.push_str(suffix);
                continue;
            }

            let mut local = opts;
            let mut zap = false;
            let target = match name.split_once(':') {
                None => name,
                Some((base, "zap")) => {
                    zap = true;
                    base
                }
                Some((base, "lax")) => {
                    local.lax = true;
                    base
                }
                Some((_, modifier)) => {
                    return Err(Error::MalformedReference {
                        value: body.clone(),
                        reason: format!("unknown modifier {modifier:?}"),
                    });
                }
            };

            if boolean {
                out.push_str(if self.truthy(target)? { "yes" } else { "no" });
                continue;
            }

            // checked before every descent, not only at entry
            if stack.iter().any(|frame| frame == target) {
                return Err(Error::Circular {
                    name: target.to_string(),
                    stack: push_owner(stack, owner),
                });
            }

            match self.resolve_entry(target)? {
                Some(value) => {
                    let deeper = push_owner(stack, owner);
                    match self.expand_value(value, Some(target), &deeper, local)? {
                        // a zapped nested line discards this line as well
                        None => return Ok(None),
                        Some(expanded) if expanded.is_empty() && zap => return Ok(None),
                        Some(expanded) => out.push_str(&expanded),
                    }
                }
                None if zap => return Ok(None),
                None => {
                    let owner_lax = owner.map(|owner| self.is_lax(owner)).unwrap_or(false);
                    if local.lax || owner_lax {
                        self.record_blank(target);
                    } else {
                        return Err(Error::Undefined {
                            name: target.to_string(),
                            stack: push_owner(stack, owner),
                        });
                    }
                }
            }
        }
        out.push_str(rest);

        if !from_file {
            return Ok(Some(out));
        }

        // the expanded text is a path; the value is that file's contents
        let contents = std::fs::read_to_string(&out).map_err(|source| Error::Io {
            path: out.clone(),
            source,
        })?;
        Ok(Some(contents.trim().to_string()))
    }

    /// Expand a block-valued key line by line
    ///
    /// `name` may carry a `:lax` suffix (the `$[[name:lax]]` form). A lone
    /// line `$[[other]]` splices the expansion of another block in place; a
    /// line opening `<?NAME` hands the region's body to the registered
    /// generator `NAME`.
    pub(crate) fn expand_multi(
        &self,
        name: &str,
        stack: &[String],
        opts: ExpandOptions,
    ) -> Result<Vec<String>> {
        let mut opts = opts;
        let name = match name.split_once(':') {
            None => name,
            Some((base, "lax")) => {
                opts.lax = true;
                base
            }
            Some((_, modifier)) => {
                return Err(Error::MalformedReference {
                    value: format!("$[[{name}]]"),
                    reason: format!("unknown modifier {modifier:?}"),
                });
            }
        };

        let lines: &[String] = match self.resolve_entry(name)? {
            Some(Value::Block(lines)) => lines,
            Some(value @ Value::Scalar(_)) => {
                return Err(Error::WrongShape {
                    name: name.to_string(),
                    actual: value.shape(),
                    requested: "a multi-line block",
                });
            }
            None => {
                let referrer_lax = stack
                    .last()
                    .map(|referrer| self.is_lax(referrer))
                    .unwrap_or(false);
                if opts.lax || referrer_lax {
                    self.record_blank(name);
                    return Ok(vec![]);
                }
                return Err(Error::Undefined {
                    name: name.to_string(),
                    stack: stack.to_vec(),
                });
            }
        };

        let mut out = vec![];
        let mut pos = 0;
        while pos < lines.len() {
            let stripped = collapse(&lines[pos]);
            let tokens: Vec<&str> = lines[pos].split_whitespace().collect();
            let first = tokens.first().copied().unwrap_or("");

            if stripped.starts_with("$[[")
                && stripped.ends_with("]]")
                && stripped.len() >= 5
                && tokens.len() <= 2
            {
                let inner = &stripped[3..stripped.len() - 2];
                if stack.iter().any(|frame| frame == inner) {
                    return Err(Error::Circular {
                        name: inner.to_string(),
                        stack: push_owner(stack, Some(name)),
                    });
                }
                // the nested name may itself contain references
                let target = self
                    .expand_text(inner, Some(name), stack, opts)?
                    .unwrap_or_default();
                let deeper = push_owner(stack, Some(name));
                out.extend(self.expand_multi(&target, &deeper, opts)?);
            } else if let Some(generator_name) = first.strip_prefix("<?") {
                let mut region = vec![];
                loop {
                    pos += 1;
                    let Some(line) = lines.get(pos) else {
                        return Err(Error::UnterminatedGenerator {
                            name: generator_name.to_string(),
                        });
                    };
                    if line.split_whitespace().next() == Some("?>") {
                        break;
                    }
                    region.push(line.clone());
                }
                let generator =
                    self.generators
                        .get(generator_name)
                        .ok_or_else(|| Error::UnknownGenerator {
                            name: generator_name.to_string(),
                        })?;
                out.push(generator.generate(&region, self)?);
            } else if let Some(line) = self.expand_text(&lines[pos], Some(name), stack, opts)? {
                out.push(line);
            }
            pos += 1;
        }
        Ok(out)
    }

    fn section_of(&self, owner: Option<&str>, context: &str) -> Result<String> {
        owner
            .and_then(|owner| self.entries.get(owner))
            .and_then(|slot| slot.section.clone())
            .ok_or_else(|| Error::MalformedReference {
                value: context.to_string(),
                reason: match owner {
                    Some(owner) => format!("no section for {owner:?}"),
                    None => "section shorthand outside any key".to_string(),
                },
            })
    }
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn push_owner(stack: &[String], owner: Option<&str>) -> Vec<String> {
    let mut stack = stack.to_vec();
    if let Some(owner) = owner {
        stack.push(owner.to_string());
    }
    stack
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::collection;
    use pretty_assertions::assert_eq;

    #[test]
    fn references_substitute_recursively() {
        let collection = collection!("a: one\nb: $[a] two\nc: $[b] three");
        assert_eq!(collection.lookup("c").unwrap(), "one two three");
    }

    #[test]
    fn no_residual_reference_tokens_remain() {
        let collection = collection!("user: drobbins\nhome: /home/$[user]/work");
        assert_eq!(collection.lookup("home").unwrap(), "/home/drobbins/work");
    }

    #[test]
    fn double_bracket_passes_through_scalar_expansion() {
        let collection = collection!("note: see $[[steps]] for details");
        assert_eq!(collection.lookup("note").unwrap(), "see $[[steps]] for details");
    }

    #[test]
    fn undefined_reference_is_fatal_when_strict() {
        let collection = collection!("broken: $[missing]");
        assert!(matches!(
            collection.lookup("broken"),
            Err(Error::Undefined { ref name, .. }) if name == "missing"
        ));
    }

    #[test]
    fn lax_keys_expand_undefined_references_to_nothing() {
        let collection = collection!("[option parse/lax]\nrsync_flags: -av$[extra_flags]");
        assert_eq!(collection.lookup("rsync_flags").unwrap(), "-av");
        // the blank is recorded for auditing
        assert_eq!(collection.blanks(), ["extra_flags"]);
    }

    #[test]
    fn lax_modifier_applies_to_a_single_reference() {
        let collection = collection!("flags: -q$[verbose:lax]\nother: $[verbose]");
        assert_eq!(collection.lookup("flags").unwrap(), "-q");
        assert!(collection.lookup("other").is_err());
    }

    #[test]
    fn lookup_with_lax_tolerates_undefined_names() {
        let collection = collection!("a: 1");
        let text = collection
            .lookup_with("missing", ExpandOptions { lax: true })
            .unwrap();
        assert_eq!(text, "");
    }

    #[test]
    fn boolean_queries_answer_yes_or_no() {
        let collection = collection!("present: value\nblank:\nsteps: [\nline\n]");
        assert_eq!(collection.lookup("present?").unwrap(), "yes");
        // a blank scalar counts as undefined
        assert_eq!(collection.lookup("blank?").unwrap(), "no");
        assert_eq!(collection.lookup("steps?").unwrap(), "yes");
        assert_eq!(collection.lookup("missing?").unwrap(), "no");
    }

    #[test]
    fn boolean_references_never_fail() {
        let collection = collection!("status: build is $[online?]");
        assert_eq!(collection.lookup("status").unwrap(), "build is no");
    }

    #[test]
    fn direct_cycles_are_reported() {
        let collection = collection!("a: $[a]");
        assert!(matches!(collection.lookup("a"), Err(Error::Circular { .. })));
    }

    #[test]
    fn mutual_cycles_are_reported_from_either_side() {
        let collection = collection!("a: $[b]\nb: $[a]");
        assert!(matches!(collection.lookup("a"), Err(Error::Circular { .. })));
        assert!(matches!(collection.lookup("b"), Err(Error::Circular { .. })));
    }

    #[test]
    fn zapped_scalar_expands_empty() {
        let collection = collection!("maybe: $[missing:zap]");
        assert_eq!(collection.lookup("maybe").unwrap(), "");
    }

    #[test]
    fn zap_discards_whole_block_lines() {
        let collection = collection!("opts: [\n--cache $[cache:zap]\n--verbose\n$[missing:zap]extra\n]");
        assert_eq!(collection.lookup_multi("opts").unwrap(), ["--verbose"]);
    }

    #[test]
    fn zap_keeps_lines_whose_reference_resolves() {
        let collection = collection!("cache: /var/cache\nopts: [\n--cache $[cache:zap]\n]");
        assert_eq!(
            collection.lookup_multi("opts").unwrap(),
            ["--cache /var/cache"]
        );
    }

    #[test]
    fn zap_on_empty_expansion_discards_too() {
        let collection = collection!("cache:\nopts: [\n--cache $[cache:zap]\n]");
        assert_eq!(collection.lookup_multi("opts").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn unknown_modifiers_are_malformed() {
        let collection = collection!("bad: $[x:frob]");
        assert!(matches!(
            collection.lookup("bad"),
            Err(Error::MalformedReference { .. })
        ));
    }

    #[test]
    fn unterminated_references_are_malformed() {
        let collection = collection!("bad: $[oops");
        assert!(matches!(
            collection.lookup("bad"),
            Err(Error::MalformedReference { .. })
        ));
    }

    #[test]
    fn section_shorthand_substitutes_the_section_name() {
        let collection = collection!("[section net]\nhost: $[]\nlabel: key $[:host]");
        assert_eq!(collection.lookup("net/host").unwrap(), "net");
        assert_eq!(collection.lookup("net/label").unwrap(), "key net/host");
    }

    #[test]
    fn section_shorthand_outside_a_section_is_malformed() {
        let collection = collection!("orphan: $[]");
        assert!(matches!(
            collection.lookup("orphan"),
            Err(Error::MalformedReference { .. })
        ));
    }

    #[test]
    fn blocks_flatten_in_scalar_context() {
        let collection = collection!("steps: [\necho  one\necho two\n]\nall: run $[steps] now");
        assert_eq!(collection.lookup("all").unwrap(), "run echo one echo two now");
    }

    #[test]
    fn block_lines_expand_independently() {
        let collection = collection!("version: 1.2\nsteps: [\nfetch $[version]\nunpack\n]");
        assert_eq!(
            collection.lookup_multi("steps").unwrap(),
            ["fetch 1.2", "unpack"]
        );
    }

    #[test]
    fn nested_multi_line_references_splice_lines() {
        let collection =
            collection!("common: [\nmount /proc\n]\nsteps: [\n$[[common]]\numount /proc\n]");
        assert_eq!(
            collection.lookup_multi("steps").unwrap(),
            ["mount /proc", "umount /proc"]
        );
    }

    #[test]
    fn nested_reference_names_are_expanded_first() {
        let collection = collection!(
            "arch: amd64\namd64/steps: [\nsetup amd64\n]\nsteps: [\n$[[$[arch]/steps]]\n]"
        );
        assert_eq!(collection.lookup_multi("steps").unwrap(), ["setup amd64"]);
    }

    #[test]
    fn nested_multi_cycles_are_reported() {
        let collection = collection!("a: [\n$[[b]]\n]\nb: [\n$[[a]]\n]");
        assert!(matches!(
            collection.lookup_multi("a"),
            Err(Error::Circular { .. })
        ));
    }

    #[test]
    fn multi_accessor_on_scalar_is_a_shape_error() {
        let collection = collection!("scalar: x");
        assert!(matches!(
            collection.lookup_multi("scalar"),
            Err(Error::WrongShape { .. })
        ));
    }

    #[test]
    fn conditional_variants_resolve_by_condition() {
        let collection = collection!(
            "target/arch: amd64\n[when target/arch is amd64]\nostype: Gentoo_64\n[when target/arch is x86]\nostype: Gentoo"
        );
        assert_eq!(collection.lookup("ostype").unwrap(), "Gentoo_64");
    }

    #[test]
    fn no_true_condition_means_undefined() {
        let collection = collection!("[when target/arch is arm]\nostype: Gentoo_arm");
        assert!(matches!(
            collection.lookup("ostype"),
            Err(Error::Undefined { .. })
        ));
        assert_eq!(collection.lookup("ostype?").unwrap(), "no");
    }

    #[test]
    fn ambiguity_is_detected_at_expansion_time() {
        // registering both variants is fine; only resolution fails
        let collection = collection!(
            "fast: yes\nsmall: yes\n[when fast]\nprofile: speed\n[when small]\nprofile: size"
        );
        assert!(matches!(
            collection.lookup("profile"),
            Err(Error::AmbiguousCondition { .. })
        ));
    }

    #[test]
    fn unconditional_wins_over_conditional() {
        // documented precedence rule: parse order may register both paths
        let collection = collection!("fast: yes\n[when fast]\nprofile: speed\n[when *]\nprofile: balanced");
        assert_eq!(collection.lookup("profile").unwrap(), "balanced");
    }

    #[test]
    fn file_indirection_reads_the_named_file() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/greeting.txt");
        let mut collection = collection!("dir: unused");
        collection
            .set("motd", format!("<< {path}"))
            .unwrap();
        assert_eq!(collection.lookup("motd").unwrap(), "Hello from the build host");
    }

    #[test]
    fn file_indirection_path_is_expanded_first() {
        let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data");
        let mut collection = collection!("name: greeting");
        collection
            .set("motd", format!("<< {dir}/$[name].txt"))
            .unwrap();
        assert_eq!(collection.lookup("motd").unwrap(), "Hello from the build host");
    }

    #[test]
    fn generators_produce_one_line() {
        let mut collection = collection!("steps: [\nbefore\n<?join\na\nb\n?>\nafter\n]");
        collection.register_generator("join", |region: &[String], _: &Collection| {
            Ok(region.join("+"))
        });
        assert_eq!(
            collection.lookup_multi("steps").unwrap(),
            ["before", "a+b", "after"]
        );
    }

    #[test]
    fn unknown_generators_error() {
        let collection = collection!("steps: [\n<?nope\n?>\n]");
        assert!(matches!(
            collection.lookup_multi("steps"),
            Err(Error::UnknownGenerator { .. })
        ));
    }

    #[test]
    fn unterminated_generator_regions_error() {
        let mut collection = collection!("steps: [\n<?join\nnever closed\n]");
        collection.register_generator("join", |region: &[String], _: &Collection| {
            Ok(region.join("+"))
        });
        assert!(matches!(
            collection.lookup_multi("steps"),
            Err(Error::UnterminatedGenerator { .. })
        ));
    }

    #[test]
    fn resolve_preserves_shape() {
        let collection = collection!("scalar: a\nblock: [\nb\n]");
        assert_eq!(collection.resolve("scalar").unwrap(), Value::Scalar("a".into()));
        assert_eq!(
            collection.resolve("block").unwrap(),
            Value::Block(vec!["b".into()])
        );
    }
}
