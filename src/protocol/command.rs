#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    State,
    SetMode,
    SetPrompt,
    SuggestedPrompts,
    AddImages,
    RemoveImage,
    ClearImages,
    DismissError,
    Generate,
    Download,
    SetConfig,
    Unknown,
}

impl From<&str> for Command {
    fn from(s: &str) -> Self {
        match s {
            "ping" => Command::Ping,
            "state" => Command::State,
            "mode.set" => Command::SetMode,
            "prompt.set" => Command::SetPrompt,
            "prompts.suggested" => Command::SuggestedPrompts,
            "images.add" => Command::AddImages,
            "images.remove" => Command::RemoveImage,
            "images.clear" => Command::ClearImages,
            "error.dismiss" => Command::DismissError,
            "generate" => Command::Generate,
            "result.download" => Command::Download,
            "config.set" => Command::SetConfig,
            _ => Command::Unknown,
        }
    }
}
