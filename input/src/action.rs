use std::fmt;

use rand::Rng;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::{ActionError, Key, MouseButton, python_str};

const SENTINELS: [&str; 3] = ["WAIT", "FAIL", "DONE"];
const DRAG_DURATION: &str = "1.0";

/// A screen position in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: impl Into<f64>, y: impl Into<f64>) -> Self {
        Self {
            x: x.into(),
            y: y.into(),
        }
    }
}

/// The accepted parameter shapes of a click.
#[derive(Debug, Clone, PartialEq)]
pub enum Click {
    /// Left click at the current position.
    Here,
    Button {
        button: MouseButton,
        clicks: Option<u32>,
    },
    At {
        point: Point,
        clicks: Option<u32>,
    },
    ButtonAt {
        button: MouseButton,
        point: Point,
        clicks: Option<u32>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scroll {
    Horizontal(i32),
    Vertical(i32),
    Both { dx: i32, dy: i32 },
}

/// Pointer motion curves used to make mouse moves look less robotic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Easing {
    InQuad,
    OutQuad,
    InOutQuad,
    InBounce,
    InElastic,
}

impl Easing {
    pub const ALL: [Easing; 5] = [
        Easing::InQuad,
        Easing::OutQuad,
        Easing::InOutQuad,
        Easing::InBounce,
        Easing::InElastic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Easing::InQuad => "pyautogui.easeInQuad",
            Easing::OutQuad => "pyautogui.easeOutQuad",
            Easing::InOutQuad => "pyautogui.easeInOutQuad",
            Easing::InBounce => "pyautogui.easeInBounce",
            Easing::InElastic => "pyautogui.easeInElastic",
        }
    }
}

/// A user-input intent, independent of how the controlled machine performs it.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Wait,
    Fail,
    Done,
    MoveTo(Option<Point>),
    Click(Click),
    MouseDown(Option<MouseButton>),
    MouseUp(Option<MouseButton>),
    RightClick(Option<Point>),
    DoubleClick(Option<Point>),
    DragTo(Point),
    Scroll(Scroll),
    Typing(String),
    Press(Key),
    KeyDown(Key),
    KeyUp(Key),
    Hotkey(Vec<Key>),
}

impl Action {
    /// Builds an action from its JSON form.
    ///
    /// Accepts a bare sentinel string (`"WAIT"`, `"FAIL"`, `"DONE"`) or an
    /// object carrying `action_type` plus its parameters, either nested under
    /// `parameters` or inlined next to `action_type`.
    pub fn from_value(value: Value) -> Result<Self, ActionError> {
        let mut object = match value {
            Value::String(name) => return sentinel(&name),
            Value::Object(object) => object,
            other => {
                return Err(ActionError::Malformed(format!(
                    "expected a string or an object, got {other}"
                )));
            }
        };

        let action_type = match object.remove("action_type") {
            Some(Value::String(action_type)) => action_type,
            Some(other) => {
                return Err(ActionError::Malformed(format!(
                    "action_type must be a string, got {other}"
                )));
            }
            None => return Err(ActionError::Malformed("missing action_type".into())),
        };

        if SENTINELS.contains(&action_type.as_str()) {
            return sentinel(&action_type);
        }

        let parameters = match object.remove("parameters") {
            Some(Value::Object(parameters)) => parameters,
            Some(Value::Null) => Map::new(),
            Some(other) => {
                return Err(ActionError::Malformed(format!(
                    "parameters must be an object, got {other}"
                )));
            }
            None => object,
        };

        Params::new(action_type, parameters).into_action()
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, Action::Wait | Action::Fail | Action::Done)
    }

    pub fn action_type(&self) -> &'static str {
        match self {
            Action::Wait => "WAIT",
            Action::Fail => "FAIL",
            Action::Done => "DONE",
            Action::MoveTo(_) => "MOVE_TO",
            Action::Click(_) => "CLICK",
            Action::MouseDown(_) => "MOUSE_DOWN",
            Action::MouseUp(_) => "MOUSE_UP",
            Action::RightClick(_) => "RIGHT_CLICK",
            Action::DoubleClick(_) => "DOUBLE_CLICK",
            Action::DragTo(_) => "DRAG_TO",
            Action::Scroll(_) => "SCROLL",
            Action::Typing(_) => "TYPING",
            Action::Press(_) => "PRESS",
            Action::KeyDown(_) => "KEY_DOWN",
            Action::KeyUp(_) => "KEY_UP",
            Action::Hotkey(_) => "HOTKEY",
        }
    }

    /// Translates the action into automation-library invocations, in the
    /// order they must run. Sentinels translate to nothing.
    pub fn translate(&self) -> Vec<String> {
        self.translate_with(&mut rand::rng())
    }

    /// Like [`Action::translate`], drawing the motion easing and duration
    /// from `rng`.
    pub fn translate_with<R: Rng>(&self, rng: &mut R) -> Vec<String> {
        match self {
            Action::Wait | Action::Fail | Action::Done => vec![],
            Action::MoveTo(None) => vec!["pyautogui.moveTo()".into()],
            Action::MoveTo(Some(point)) => {
                let easing = Easing::ALL[rng.random_range(0..Easing::ALL.len())];
                let duration: f64 = rng.random_range(0.5..=1.0);
                vec![format!(
                    "pyautogui.moveTo({}, {}, {duration}, {})",
                    Coord(point.x),
                    Coord(point.y),
                    easing.as_str()
                )]
            }
            Action::Click(click) => vec![translate_click(click)],
            Action::MouseDown(button) => vec![with_button("pyautogui.mouseDown", *button)],
            Action::MouseUp(button) => vec![with_button("pyautogui.mouseUp", *button)],
            Action::RightClick(point) => vec![with_point("pyautogui.rightClick", *point)],
            Action::DoubleClick(point) => vec![with_point("pyautogui.doubleClick", *point)],
            Action::DragTo(point) => vec![format!(
                "pyautogui.dragTo({}, {}, duration={DRAG_DURATION}, button='left', mouseDownUp=True)",
                Coord(point.x),
                Coord(point.y)
            )],
            Action::Scroll(Scroll::Horizontal(dx)) => vec![format!("pyautogui.hscroll({dx})")],
            Action::Scroll(Scroll::Vertical(dy)) => vec![format!("pyautogui.vscroll({dy})")],
            Action::Scroll(Scroll::Both { dx, dy }) => vec![
                format!("pyautogui.hscroll({dx})"),
                format!("pyautogui.vscroll({dy})"),
            ],
            Action::Typing(text) => vec![format!("pyautogui.typewrite({})", python_str(text))],
            Action::Press(key) => vec![format!("pyautogui.press({})", python_str(key))],
            Action::KeyDown(key) => vec![format!("pyautogui.keyDown({})", python_str(key))],
            Action::KeyUp(key) => vec![format!("pyautogui.keyUp({})", python_str(key))],
            Action::Hotkey(keys) => {
                let keys: Vec<_> = keys.iter().map(|key| python_str(key)).collect();
                vec![format!("pyautogui.hotkey({})", keys.join(", "))]
            }
        }
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Action::from_value(value).map_err(serde::de::Error::custom)
    }
}

/// Formats a coordinate without a trailing `.0` for whole numbers.
struct Coord(f64);

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn sentinel(name: &str) -> Result<Action, ActionError> {
    match name {
        "WAIT" => Ok(Action::Wait),
        "FAIL" => Ok(Action::Fail),
        "DONE" => Ok(Action::Done),
        other => Err(ActionError::UnknownActionType(other.to_string())),
    }
}

fn translate_click(click: &Click) -> String {
    let clicks = |clicks: &Option<u32>| match clicks {
        Some(n) => format!(", clicks={n}"),
        None => String::new(),
    };

    match click {
        Click::Here => "pyautogui.click()".into(),
        Click::Button { button, clicks: n } => {
            format!("pyautogui.click(button='{button}'{})", clicks(n))
        }
        Click::At { point, clicks: n } => format!(
            "pyautogui.click(x={}, y={}{})",
            Coord(point.x),
            Coord(point.y),
            clicks(n)
        ),
        Click::ButtonAt {
            button,
            point,
            clicks: n,
        } => format!(
            "pyautogui.click(button='{button}', x={}, y={}{})",
            Coord(point.x),
            Coord(point.y),
            clicks(n)
        ),
    }
}

fn with_button(function: &str, button: Option<MouseButton>) -> String {
    match button {
        Some(button) => format!("{function}(button='{button}')"),
        None => format!("{function}()"),
    }
}

fn with_point(function: &str, point: Option<Point>) -> String {
    match point {
        Some(point) => format!("{function}(x={}, y={})", Coord(point.x), Coord(point.y)),
        None => format!("{function}()"),
    }
}

/// Consumes named parameters one by one; whatever is left over at the end
/// makes the shape invalid.
struct Params {
    action_type: String,
    original: Map<String, Value>,
    remaining: Map<String, Value>,
}

impl Params {
    fn new(action_type: String, parameters: Map<String, Value>) -> Self {
        Self {
            action_type,
            original: parameters.clone(),
            remaining: parameters,
        }
    }

    fn invalid(&self) -> ActionError {
        ActionError::InvalidParameters {
            action_type: self.action_type.clone(),
            parameters: Value::Object(self.original.clone()),
        }
    }

    fn into_action(mut self) -> Result<Action, ActionError> {
        let action = match self.action_type.as_str() {
            "MOVE_TO" => Action::MoveTo(self.point()?),
            "CLICK" => {
                let button = self.button()?;
                let point = self.point()?;
                let clicks = self.clicks()?;
                Action::Click(match (button, point, clicks) {
                    (None, None, None) => Click::Here,
                    (None, None, Some(_)) => return Err(self.invalid()),
                    (Some(button), None, clicks) => Click::Button { button, clicks },
                    (None, Some(point), clicks) => Click::At { point, clicks },
                    (Some(button), Some(point), clicks) => Click::ButtonAt {
                        button,
                        point,
                        clicks,
                    },
                })
            }
            "MOUSE_DOWN" => Action::MouseDown(self.button()?),
            "MOUSE_UP" => Action::MouseUp(self.button()?),
            "RIGHT_CLICK" => Action::RightClick(self.point()?),
            "DOUBLE_CLICK" => Action::DoubleClick(self.point()?),
            "DRAG_TO" => match self.point()? {
                Some(point) => Action::DragTo(point),
                None => return Err(self.invalid()),
            },
            "SCROLL" => {
                let dx = self.scroll_delta("dx")?;
                let dy = self.scroll_delta("dy")?;
                Action::Scroll(match (dx, dy) {
                    (Some(dx), Some(dy)) => Scroll::Both { dx, dy },
                    (Some(dx), None) => Scroll::Horizontal(dx),
                    (None, Some(dy)) => Scroll::Vertical(dy),
                    (None, None) => return Err(self.invalid()),
                })
            }
            "TYPING" => match self.take("text") {
                Some(Value::String(text)) => Action::Typing(text),
                _ => return Err(self.invalid()),
            },
            "PRESS" => Action::Press(self.key()?),
            "KEY_DOWN" => Action::KeyDown(self.key()?),
            "KEY_UP" => Action::KeyUp(self.key()?),
            "HOTKEY" => Action::Hotkey(self.keys()?),
            other => return Err(ActionError::UnknownActionType(other.to_string())),
        };

        if self.remaining.is_empty() {
            Ok(action)
        } else {
            Err(self.invalid())
        }
    }

    fn take(&mut self, name: &str) -> Option<Value> {
        self.remaining.remove(name)
    }

    fn point(&mut self) -> Result<Option<Point>, ActionError> {
        match (self.take("x"), self.take("y")) {
            (None, None) => Ok(None),
            (Some(x), Some(y)) => match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => Ok(Some(Point { x, y })),
                _ => Err(self.invalid()),
            },
            _ => Err(self.invalid()),
        }
    }

    fn button(&mut self) -> Result<Option<MouseButton>, ActionError> {
        match self.take("button") {
            None => Ok(None),
            Some(Value::String(name)) => name.parse().map(Some),
            Some(_) => Err(self.invalid()),
        }
    }

    fn clicks(&mut self) -> Result<Option<u32>, ActionError> {
        match self.take("num_clicks") {
            None => Ok(None),
            Some(value) => value
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| self.invalid()),
        }
    }

    fn scroll_delta(&mut self, name: &str) -> Result<Option<i32>, ActionError> {
        match self.take(name) {
            None => Ok(None),
            Some(value) => value
                .as_i64()
                .and_then(|n| i32::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| self.invalid()),
        }
    }

    fn key(&mut self) -> Result<Key, ActionError> {
        match self.take("key") {
            Some(Value::String(name)) => Key::new(name),
            _ => Err(self.invalid()),
        }
    }

    fn keys(&mut self) -> Result<Vec<Key>, ActionError> {
        let names = match self.take("keys") {
            Some(Value::Array(names)) if !names.is_empty() => names,
            _ => return Err(self.invalid()),
        };

        let names = names
            .into_iter()
            .map(|name| match name {
                Value::String(name) => Ok(name),
                _ => Err(self.invalid()),
            })
            .collect::<Result<Vec<_>, _>>()?;

        names
            .iter()
            .map(Key::new)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ActionError::InvalidHotkey(names.clone()))
    }
}
