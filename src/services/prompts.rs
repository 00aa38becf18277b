use crate::model::workflow::Mode;

const EDIT_PROMPTS: &[&str] = &[
    "Remove the background",
    "Make it look like a vintage photograph",
    "Enhance the colors and lighting",
    "Convert to black and white",
    "Turn it into a watercolor painting",
    "Add a soft bokeh effect to the background",
];

const ANALYZE_PROMPTS: &[&str] = &[
    "Describe this image in detail",
    "List all the objects you can see",
    "Extract any text in this image",
    "What is the mood of this photo?",
    "Suggest improvements to the composition",
];

/// Shortcut prompts offered next to the prompt field.
pub fn suggested(mode: Mode) -> &'static [&'static str] {
    match mode {
        Mode::Edit => EDIT_PROMPTS,
        Mode::Analyze => ANALYZE_PROMPTS,
    }
}
