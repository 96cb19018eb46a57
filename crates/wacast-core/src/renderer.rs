//! Template rendering
//!
//! Pure expansion of a fetched template definition plus a campaign's
//! parameter binding plus one contact into the provider-ready template
//! message. No network, no database.

use crate::entities::{ContactRecord, DynamicField, ParameterBinding, ParameterInput, ParameterType};
use crate::utils::split_name;
use wacast_whatsapp::types::{
    HeaderFormat, LocationParameter, MediaLink, TemplateComponent, TemplateComponentDefinition,
    TemplateComponentKind, TemplateDefinition, TemplateLanguage, TemplateMessage,
    TemplateParameter,
};

/// Rendering failures
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RenderError {
    /// The template declares placeholders but the campaign binds none.
    /// The dispatcher treats this as fatal for the whole campaign.
    #[error("template declares placeholders but no parameters are bound")]
    MissingParameters,
    #[error("location header parameter is not valid JSON: {0}")]
    MalformedLocation(String),
    #[error("location header declared but no parameter bound")]
    MissingLocationParameter,
    #[error("unsupported header format")]
    UnsupportedHeaderFormat,
}

/// Resolve one bound parameter against a contact
fn resolve_value(param: &ParameterInput, contact: &ContactRecord) -> String {
    match param.parameter_type {
        ParameterType::Static => param.static_value.clone().unwrap_or_default(),
        ParameterType::Dynamic => match param.dynamic_field {
            Some(DynamicField::FirstName) => split_name(&contact.name).0,
            Some(DynamicField::LastName) => split_name(&contact.name).1,
            Some(DynamicField::PhoneNumber) => contact.phone.clone(),
            None => String::new(),
        },
    }
}

/// Expand a template for one contact into the provider payload
pub fn render_template(
    template: &TemplateDefinition,
    binding: &ParameterBinding,
    contact: &ContactRecord,
) -> Result<TemplateMessage, RenderError> {
    if template.requires_parameters() && binding.is_empty() {
        return Err(RenderError::MissingParameters);
    }

    let mut components = Vec::new();

    for component in &template.components {
        match component.kind {
            TemplateComponentKind::Body => {
                components.push(render_body(component, &binding.body, contact));
            }
            TemplateComponentKind::Header => {
                components.push(render_header(component, &binding.header, contact)?);
            }
            TemplateComponentKind::Buttons => {
                components.extend(render_buttons(component, &binding.buttons, contact));
            }
            TemplateComponentKind::Footer | TemplateComponentKind::Unknown => {}
        }
    }

    Ok(TemplateMessage {
        name: template.name.clone(),
        language: TemplateLanguage {
            code: template.language.clone(),
        },
        components,
    })
}

fn render_body(
    component: &TemplateComponentDefinition,
    body_params: &[ParameterInput],
    contact: &ContactRecord,
) -> TemplateComponent {
    let has_placeholders = component
        .example
        .as_ref()
        .map(|example| !example.body_text.is_empty())
        .unwrap_or(false);

    let parameters = if has_placeholders {
        body_params
            .iter()
            .map(|param| TemplateParameter::Text {
                text: resolve_value(param, contact),
            })
            .collect()
    } else {
        Vec::new()
    };

    TemplateComponent::body(parameters)
}

fn render_header(
    component: &TemplateComponentDefinition,
    header_params: &[ParameterInput],
    contact: &ContactRecord,
) -> Result<TemplateComponent, RenderError> {
    let has_placeholders = component
        .example
        .as_ref()
        .map(|example| !example.header_text.is_empty() || !example.header_handle.is_empty())
        .unwrap_or(false);

    if !has_placeholders {
        return Ok(TemplateComponent::header(Vec::new()));
    }

    let parameters = match component.format {
        Some(HeaderFormat::Text) => header_params
            .iter()
            .map(|param| TemplateParameter::Text {
                text: resolve_value(param, contact),
            })
            .collect(),
        Some(HeaderFormat::Image) => header_params
            .iter()
            .map(|param| TemplateParameter::Image {
                image: MediaLink {
                    link: resolve_value(param, contact),
                },
            })
            .collect(),
        Some(HeaderFormat::Video) => header_params
            .iter()
            .map(|param| TemplateParameter::Video {
                video: MediaLink {
                    link: resolve_value(param, contact),
                },
            })
            .collect(),
        Some(HeaderFormat::Document) => header_params
            .iter()
            .map(|param| TemplateParameter::Document {
                document: MediaLink {
                    link: resolve_value(param, contact),
                },
            })
            .collect(),
        Some(HeaderFormat::Location) => {
            let first = header_params
                .first()
                .ok_or(RenderError::MissingLocationParameter)?;
            let raw = resolve_value(first, contact);
            let location: LocationParameter = serde_json::from_str(&raw)
                .map_err(|e| RenderError::MalformedLocation(e.to_string()))?;
            vec![TemplateParameter::Location { location }]
        }
        Some(HeaderFormat::Unknown) | None => return Err(RenderError::UnsupportedHeaderFormat),
    };

    Ok(TemplateComponent::header(parameters))
}

fn render_buttons(
    component: &TemplateComponentDefinition,
    button_params: &[ParameterInput],
    contact: &ContactRecord,
) -> Vec<TemplateComponent> {
    use wacast_whatsapp::types::ButtonKind;

    let mut components = Vec::new();

    for (index, button) in component.buttons.iter().enumerate() {
        let Some(param) = button_params.get(index) else {
            continue;
        };
        let value = resolve_value(param, contact);

        match button.kind {
            ButtonKind::Url => components.push(TemplateComponent::button(
                "url",
                index,
                vec![TemplateParameter::Text { text: value }],
            )),
            ButtonKind::QuickReply => components.push(TemplateComponent::button(
                "quick_reply",
                index,
                vec![TemplateParameter::Payload { payload: value }],
            )),
            ButtonKind::PhoneNumber => components.push(TemplateComponent::button(
                "phone_number",
                index,
                vec![TemplateParameter::Text { text: value }],
            )),
            ButtonKind::CopyCode => components.push(TemplateComponent::button(
                "copy_code",
                index,
                vec![TemplateParameter::Text { text: value }],
            )),
            ButtonKind::Unknown => {}
        }
    }

    components
}
