//! One-pass whitelisted template substitutor for the `server-patch`
//! annotation (§4.3 step 2, §9 "Templating as a one-pass whitelisted
//! substitutor").
//!
//! Placeholders look like `{{NodeName}}`; only the three `BindingContext`
//! fields are substitutable. Anything else inside `{{ }}` is rejected
//! rather than silently left in place, since a typo'd placeholder leaking
//! into a live pod spec is worse than a hard failure at bind time.

use models::binding::BindingContext;
use models::ModelError;

pub fn expand(template: &str, ctx: &BindingContext) -> Result<String, ModelError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            return Err(ModelError::MalformedTemplate(
                "unterminated `{{` placeholder".to_string(),
            ));
        };
        let field = after_open[..end].trim();
        out.push_str(&resolve_field(field, ctx)?);
        rest = &after_open[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn resolve_field(field: &str, ctx: &BindingContext) -> Result<String, ModelError> {
    match field {
        "NodeName" => Ok(ctx.node_name.clone()),
        "AcceleratorIndices" => Ok(ctx.cuda_visible_devices()),
        "LocalVolume" => Ok(ctx.local_volume.clone().unwrap_or_default()),
        other => Err(ModelError::UnknownTemplateField(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> BindingContext {
        BindingContext {
            node_name: "node-7".to_string(),
            accelerator_indices: vec![0, 2],
            local_volume: Some("/data/cache".to_string()),
        }
    }

    #[test]
    fn expands_known_fields() {
        let out = expand(
            r#"{"nodeName": "{{NodeName}}", "cuda": "{{AcceleratorIndices}}"}"#,
            &ctx(),
        )
        .unwrap();
        assert_eq!(out, r#"{"nodeName": "node-7", "cuda": "0,2"}"#);
    }

    #[test]
    fn rejects_unknown_field() {
        let err = expand("{{Bogus}}", &ctx()).unwrap_err();
        assert!(matches!(err, ModelError::UnknownTemplateField(f) if f == "Bogus"));
    }

    #[test]
    fn passes_through_plain_text() {
        let out = expand("no placeholders here", &ctx()).unwrap();
        assert_eq!(out, "no placeholders here");
    }
}
