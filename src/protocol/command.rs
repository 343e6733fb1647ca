//! WebDriver (JsonWire) command table.
//!
//! Only commands listed here may be sent through the bridge. Anything else
//! is rejected locally with [`Error::UnrecognizedCommand`] before any bytes
//! reach the socket.
//!
//! # Command Groups
//!
//! | Group | Examples |
//! |-------|----------|
//! | Session | `newSession`, `quit`, `status` |
//! | Navigation | `get`, `goBack`, `refresh`, `getTitle` |
//! | Elements | `findElement`, `clickElement`, `getElementText` |
//! | Windows & frames | `switchToWindow`, `switchToFrame`, `windowMaximize` |
//! | Scripts | `executeScript`, `executeAsyncScript` |
//! | Alerts | `acceptAlert`, `getAlertText` |
//! | Input | `mouseClick`, `touchSingleTap` |
//! | Storage | `getLocalStorageItem`, `getSessionStorageKeys` |
//!
//! [`Error::UnrecognizedCommand`]: crate::Error::UnrecognizedCommand

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

// ============================================================================
// Table
// ============================================================================

macro_rules! driver_commands {
    ($( $(#[$meta:meta])* $variant:ident => $name:literal, )+) => {
        /// A recognized WebDriver command.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum DriverCommand {
            $( $(#[$meta])* $variant, )+
        }

        impl DriverCommand {
            /// Every recognized command.
            pub const ALL: &'static [DriverCommand] = &[$( DriverCommand::$variant, )+];

            /// Returns the wire name of the command.
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $( DriverCommand::$variant => $name, )+
                }
            }

            /// Looks up a command by wire name.
            #[must_use]
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $( $name => Some(DriverCommand::$variant), )+
                    _ => None,
                }
            }
        }
    };
}

driver_commands! {
    // Session
    /// Creates a session from desired capabilities.
    NewSession => "newSession",
    /// Deletes the current session.
    DeleteSession => "deleteSession",
    /// Ends the session and closes every window.
    Quit => "quit",
    /// Reports remote end status.
    Status => "status",
    /// Returns the session capabilities.
    GetCapabilities => "getCapabilities",

    // Navigation
    /// Navigates to a URL.
    Get => "get",
    /// History back.
    GoBack => "goBack",
    /// History forward.
    GoForward => "goForward",
    /// Reloads the page.
    Refresh => "refresh",
    /// Current URL.
    GetCurrentUrl => "getCurrentUrl",
    /// Page title.
    GetTitle => "getTitle",
    /// Page source.
    GetPageSource => "getPageSource",

    // Cookies
    /// Adds a cookie.
    AddCookie => "addCookie",
    /// Reads a cookie by name.
    GetCookie => "getCookie",
    /// Reads all cookies.
    GetAllCookies => "getCookies",
    /// Deletes a cookie by name.
    DeleteCookie => "deleteCookie",
    /// Deletes all cookies.
    DeleteAllCookies => "deleteAllCookies",

    // Elements
    /// Finds one element.
    FindElement => "findElement",
    /// Finds many elements.
    FindElements => "findElements",
    /// Finds one element below another.
    FindChildElement => "findChildElement",
    /// Finds many elements below another.
    FindChildElements => "findChildElements",
    /// Focused element.
    GetActiveElement => "getActiveElement",
    /// Clears an input.
    ClearElement => "clearElement",
    /// Clicks an element.
    ClickElement => "clickElement",
    /// Types into an element.
    SendKeysToElement => "sendKeysToElement",
    /// Types into the focused element.
    SendKeysToActiveElement => "sendKeysToActiveElement",
    /// Submits a form.
    SubmitElement => "submitElement",
    /// Uploads a file to the remote end.
    UploadFile => "uploadFile",
    /// Visible text.
    GetElementText => "getElementText",
    /// Value property.
    GetElementValue => "getElementValue",
    /// Tag name.
    GetElementTagName => "getElementTagName",
    /// Selects an option.
    SetElementSelected => "setElementSelected",
    /// Selection state.
    IsElementSelected => "isElementSelected",
    /// Enabled state.
    IsElementEnabled => "isElementEnabled",
    /// Display state.
    IsElementDisplayed => "isElementDisplayed",
    /// Location on the page.
    GetElementLocation => "getElementLocation",
    /// Location after scrolling into view.
    GetElementLocationOnceScrolledIntoView => "getElementLocationOnceScrolledIntoView",
    /// Size.
    GetElementSize => "getElementSize",
    /// Bounding rectangle.
    GetElementRect => "getElementRect",
    /// Attribute value.
    GetElementAttribute => "getElementAttribute",
    /// Computed CSS property.
    GetElementValueOfCssProperty => "getElementValueOfCssProperty",
    /// Element identity comparison.
    ElementEquals => "elementEquals",
    /// Element screenshot.
    ElementScreenshot => "elementScreenshot",

    // Windows & frames
    /// Closes the current window.
    Close => "close",
    /// Current window handle.
    GetCurrentWindowHandle => "getCurrentWindowHandle",
    /// All window handles.
    GetWindowHandles => "getWindowHandles",
    /// Window size.
    GetWindowSize => "getWindowSize",
    /// Window position.
    GetWindowPosition => "getWindowPosition",
    /// Resizes the window.
    SetWindowSize => "setWindowSize",
    /// Moves the window.
    SetWindowPosition => "setWindowPosition",
    /// Maximizes the window.
    MaximizeWindow => "windowMaximize",
    /// Switches window.
    SwitchToWindow => "switchToWindow",
    /// Switches frame.
    SwitchToFrame => "switchToFrame",
    /// Switches to the parent frame.
    SwitchToParentFrame => "switchToParentFrame",
    /// Page screenshot.
    Screenshot => "screenshot",

    // Scripts & timeouts
    /// Runs a synchronous script.
    ExecuteScript => "executeScript",
    /// Runs an asynchronous script.
    ExecuteAsyncScript => "executeAsyncScript",
    /// Implicit wait timeout.
    ImplicitWait => "implicitlyWait",
    /// Script timeout.
    SetScriptTimeout => "setScriptTimeout",
    /// Generic timeouts.
    SetTimeouts => "setTimeouts",

    // Alerts
    /// Dismisses an alert.
    DismissAlert => "dismissAlert",
    /// Accepts an alert.
    AcceptAlert => "acceptAlert",
    /// Types into a prompt.
    SetAlertValue => "setAlertValue",
    /// Alert text.
    GetAlertText => "getAlertText",
    /// Authenticates an HTTP auth prompt.
    SetAlertCredentials => "setAlertCredentials",

    // Mouse
    /// Clicks at the mouse position.
    Click => "mouseClick",
    /// Double-clicks at the mouse position.
    DoubleClick => "mouseDoubleClick",
    /// Presses a mouse button.
    MouseDown => "mouseButtonDown",
    /// Releases a mouse button.
    MouseUp => "mouseButtonUp",
    /// Moves the mouse.
    MoveTo => "mouseMoveTo",

    // Touch
    /// Single tap.
    SingleTap => "touchSingleTap",
    /// Double tap.
    DoubleTap => "touchDoubleTap",
    /// Long press.
    LongPress => "touchLongPress",
    /// Finger down.
    TouchDown => "touchDown",
    /// Finger up.
    TouchUp => "touchUp",
    /// Finger move.
    TouchMove => "touchMove",
    /// Scroll gesture.
    TouchScroll => "touchScroll",
    /// Flick gesture.
    Flick => "touchFlick",

    // Device
    /// Screen orientation.
    GetScreenOrientation => "getScreenOrientation",
    /// Rotates the screen.
    SetScreenOrientation => "setScreenOrientation",
    /// Geolocation.
    GetLocation => "getLocation",
    /// Overrides geolocation.
    SetLocation => "setLocation",
    /// Network connection type.
    GetNetworkConnection => "getNetworkConnection",
    /// Sets network connection type.
    SetNetworkConnection => "setNetworkConnection",

    // Logs
    /// Reads a log.
    GetLog => "getLog",
    /// Lists log types.
    GetAvailableLogTypes => "getAvailableLogTypes",

    // HTML5
    /// Runs SQL on web storage.
    ExecuteSql => "executeSql",
    /// Application cache.
    GetAppCache => "getAppCache",
    /// Application cache status.
    GetAppCacheStatus => "getAppCacheStatus",
    /// Clears the application cache.
    ClearAppCache => "clearAppCache",
    /// Local storage item.
    GetLocalStorageItem => "getLocalStorageItem",
    /// Removes a local storage item.
    RemoveLocalStorageItem => "removeLocalStorageItem",
    /// Local storage keys.
    GetLocalStorageKeys => "getLocalStorageKeys",
    /// Sets a local storage item.
    SetLocalStorageItem => "setLocalStorageItem",
    /// Clears local storage.
    ClearLocalStorage => "clearLocalStorage",
    /// Local storage size.
    GetLocalStorageSize => "getLocalStorageSize",
    /// Session storage item.
    GetSessionStorageItem => "getSessionStorageItem",
    /// Removes a session storage item.
    RemoveSessionStorageItem => "removeSessionStorageItem",
    /// Session storage keys.
    GetSessionStorageKeys => "getSessionStorageKeys",
    /// Sets a session storage item.
    SetSessionStorageItem => "setSessionStorageItem",
    /// Clears session storage.
    ClearSessionStorage => "clearSessionStorage",
    /// Session storage size.
    GetSessionStorageSize => "getSessionStorageSize",
}

// ============================================================================
// Conversions
// ============================================================================

impl DriverCommand {
    /// Looks up a command by wire name, failing for unknown names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnrecognizedCommand`] if the name is not in the table.
    pub fn parse(name: &str) -> Result<Self> {
        Self::from_name(name).ok_or_else(|| Error::unrecognized_command(name))
    }

    /// Returns `true` for commands that do not need a bound session.
    #[inline]
    #[must_use]
    pub const fn is_session_free(self) -> bool {
        matches!(self, Self::NewSession | Self::Status)
    }
}

impl fmt::Display for DriverCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DriverCommand {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for DriverCommand {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for DriverCommand {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Self::from_name(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("unrecognised command {name}")))
    }
}

// ============================================================================
// Tests
// ============================================================================
