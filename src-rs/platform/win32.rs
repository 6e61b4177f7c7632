//! Win32 implementation of [`Desktop`].

use image::RgbaImage;
use std::cell::RefCell;
use std::ffi::c_void;
use std::sync::Once;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use windows::core::{w, PCWSTR};
use windows::Win32::Foundation::{BOOL, COLORREF, HINSTANCE, HWND, LPARAM, LRESULT, POINT, RECT, WPARAM};
use windows::Win32::Graphics::Dwm::{
    DwmFlush, DwmGetWindowAttribute, DWMWA_CLOAKED, DWMWA_EXTENDED_FRAME_BOUNDS,
};
use windows::Win32::Graphics::Gdi::{
    BeginPaint, BitBlt, ClientToScreen, CreateCompatibleBitmap, CreateCompatibleDC,
    CreateSolidBrush, DeleteDC, DeleteObject, DrawTextW, EndPaint, FillRect, GetDC, GetDIBits,
    GetStockObject, ReleaseDC, ScreenToClient, SelectObject, SetBkMode, SetTextColor,
    UpdateWindow, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, CAPTUREBLT, DEFAULT_GUI_FONT,
    DIB_RGB_COLORS, DT_CENTER, DT_SINGLELINE, DT_VCENTER, PAINTSTRUCT, ROP_CODE, SRCCOPY,
    TRANSPARENT,
};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::HiDpi::{
    GetDpiForSystem, SetProcessDpiAwarenessContext, DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, EnumWindows, GetAncestor,
    GetClientRect, GetForegroundWindow, GetGUIThreadInfo, GetSystemMetrics, GetWindowRect,
    GetWindowTextW, GetWindowThreadProcessId, IsIconic, IsWindow, IsWindowVisible, IsZoomed,
    PeekMessageW, PostMessageW, RegisterClassExW, SetForegroundWindow, SetLayeredWindowAttributes,
    SetProcessDPIAware, SetWindowDisplayAffinity, SetWindowPos, ShowWindow, TranslateMessage,
    WindowFromPoint, GA_ROOT, GUITHREADINFO, HTTRANSPARENT, LWA_ALPHA, MSG, PM_REMOVE,
    SM_CXSCREEN, SM_CYSCREEN, SWP_NOACTIVATE, SWP_NOMOVE, SWP_NOSIZE, SWP_NOZORDER, SW_MAXIMIZE,
    SW_RESTORE, SW_SHOWNOACTIVATE, WINDOW_DISPLAY_AFFINITY, WM_CHAR, WM_LBUTTONDOWN, WM_LBUTTONUP,
    WM_MOUSEMOVE, WM_NCHITTEST, WM_PAINT, WNDCLASSEXW, WS_EX_LAYERED, WS_EX_NOACTIVATE,
    WS_EX_TOOLWINDOW, WS_EX_TOPMOST, WS_EX_TRANSPARENT, WS_POPUP,
};

use super::{Desktop, OverlaySurface, ShowState, WindowFrames, WindowHandle, WindowMessage};
use crate::capture::OverlaySpec;
use crate::error::DriverError;
use crate::geometry::{DisplayInfo, Point, Rect};
use crate::input::make_lparam;
use crate::window::Placement;

const OVERLAY_CLASS: PCWSTR = w!("DesktopDriverCaptureOverlay");
const MK_LBUTTON: usize = 0x0001;
/// WDA_EXCLUDEFROMCAPTURE; honoured from Windows 10 2004 on.
const EXCLUDE_FROM_CAPTURE: WINDOW_DISPLAY_AFFINITY = WINDOW_DISPLAY_AFFINITY(0x11);
const PUMP_INTERVAL: Duration = Duration::from_millis(10);

static REGISTER: Once = Once::new();

struct BannerPaint {
    text: Vec<u16>,
    background: COLORREF,
    text_color: COLORREF,
}

thread_local! {
    static BANNER: RefCell<Option<BannerPaint>> = const { RefCell::new(None) };
}

pub struct Win32Desktop;

impl Win32Desktop {
    /// Declares DPI awareness so every rect below is in physical pixels.
    pub fn new() -> Self {
        unsafe {
            if SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2).is_err() {
                debug!("per-monitor v2 DPI awareness unavailable, falling back to system aware");
                let _ = SetProcessDPIAware();
            }
        }
        Self
    }
}

fn hwnd(handle: WindowHandle) -> HWND {
    HWND(handle.0 as *mut c_void)
}

fn handle_of(hwnd: HWND) -> Option<WindowHandle> {
    if hwnd.is_invalid() {
        None
    } else {
        Some(WindowHandle(hwnd.0 as isize))
    }
}

fn rect_of(rect: RECT) -> Rect {
    Rect::new(rect.left, rect.top, rect.right, rect.bottom)
}

fn colorref(rgb: [u8; 3]) -> COLORREF {
    COLORREF(rgb[0] as u32 | (rgb[1] as u32) << 8 | (rgb[2] as u32) << 16)
}

/// Cloaked windows (other virtual desktops, suspended UWP frames) report as
/// visible but are not on screen.
unsafe fn is_cloaked(hwnd: HWND) -> bool {
    let mut cloaked: u32 = 0;
    DwmGetWindowAttribute(
        hwnd,
        DWMWA_CLOAKED,
        &mut cloaked as *mut u32 as *mut c_void,
        std::mem::size_of::<u32>() as u32,
    )
    .is_ok()
        && cloaked != 0
}

unsafe extern "system" fn collect_window(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let windows = &mut *(lparam.0 as *mut Vec<(WindowHandle, String)>);
    if IsWindowVisible(hwnd).as_bool() && !is_cloaked(hwnd) {
        let mut buf = [0u16; 512];
        let len = GetWindowTextW(hwnd, &mut buf);
        if len > 0 {
            let title = String::from_utf16_lossy(&buf[..len as usize]);
            windows.push((WindowHandle(hwnd.0 as isize), title));
        }
    }
    BOOL(1)
}

impl Desktop for Win32Desktop {
    fn display_info(&self) -> Result<DisplayInfo, DriverError> {
        let (width, height, dpi) = unsafe {
            (
                GetSystemMetrics(SM_CXSCREEN),
                GetSystemMetrics(SM_CYSCREEN),
                GetDpiForSystem(),
            )
        };
        if width <= 0 || height <= 0 {
            return Err(DriverError::CaptureFailed(
                "could not measure the primary screen".to_string(),
            ));
        }
        Ok(DisplayInfo::from_dpi(width, height, dpi))
    }

    fn top_level_windows(&self) -> Result<Vec<(WindowHandle, String)>, DriverError> {
        let mut windows: Vec<(WindowHandle, String)> = Vec::new();
        unsafe {
            EnumWindows(
                Some(collect_window),
                LPARAM(&mut windows as *mut Vec<(WindowHandle, String)> as isize),
            )
            .map_err(|err| DriverError::WindowNotFound(format!("EnumWindows failed: {err}")))?;
        }
        debug!(count = windows.len(), "enumerated top-level windows");
        Ok(windows)
    }

    fn is_window(&self, handle: WindowHandle) -> bool {
        unsafe { IsWindow(hwnd(handle)).as_bool() }
    }

    fn window_frames(&self, handle: WindowHandle) -> Result<WindowFrames, DriverError> {
        let h = hwnd(handle);
        unsafe {
            let mut outer = RECT::default();
            GetWindowRect(h, &mut outer).map_err(|err| {
                DriverError::WindowNotFound(format!("GetWindowRect failed: {err}"))
            })?;

            let mut frame = RECT::default();
            let frame = match DwmGetWindowAttribute(
                h,
                DWMWA_EXTENDED_FRAME_BOUNDS,
                &mut frame as *mut RECT as *mut c_void,
                std::mem::size_of::<RECT>() as u32,
            ) {
                Ok(()) => frame,
                Err(_) => outer,
            };

            let mut client = RECT::default();
            GetClientRect(h, &mut client).map_err(|err| {
                DriverError::WindowNotFound(format!("GetClientRect failed: {err}"))
            })?;
            let mut origin = POINT { x: 0, y: 0 };
            if !ClientToScreen(h, &mut origin).as_bool() {
                return Err(DriverError::WindowNotFound(
                    "ClientToScreen failed".to_string(),
                ));
            }

            Ok(WindowFrames {
                outer: rect_of(outer),
                frame: rect_of(frame),
                client: Rect::from_size(origin.x, origin.y, client.right, client.bottom),
            })
        }
    }

    fn is_maximized(&self, handle: WindowHandle) -> bool {
        unsafe { IsZoomed(hwnd(handle)).as_bool() }
    }

    fn is_minimized(&self, handle: WindowHandle) -> bool {
        unsafe { IsIconic(hwnd(handle)).as_bool() }
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        handle_of(unsafe { GetForegroundWindow() })
    }

    fn show_window(&self, handle: WindowHandle, state: ShowState) {
        let cmd = match state {
            ShowState::Restore => SW_RESTORE,
            ShowState::Maximize => SW_MAXIMIZE,
        };
        unsafe {
            let _ = ShowWindow(hwnd(handle), cmd);
        }
    }

    fn request_foreground(&self, handle: WindowHandle) -> bool {
        unsafe { SetForegroundWindow(hwnd(handle)).as_bool() }
    }

    fn move_window(&self, handle: WindowHandle, placement: &Placement) -> Result<(), DriverError> {
        let mut flags = SWP_NOZORDER | SWP_NOACTIVATE;
        let (x, y) = match placement.position {
            Some(p) => (p.x, p.y),
            None => {
                flags |= SWP_NOMOVE;
                (0, 0)
            }
        };
        let (cx, cy) = match placement.size {
            Some(size) => size,
            None => {
                flags |= SWP_NOSIZE;
                (0, 0)
            }
        };
        unsafe { SetWindowPos(hwnd(handle), None, x, y, cx, cy, flags) }
            .map_err(|err| DriverError::WindowNotFound(format!("SetWindowPos failed: {err}")))
    }

    fn window_from_point(&self, point: Point) -> Option<WindowHandle> {
        handle_of(unsafe { WindowFromPoint(POINT { x: point.x, y: point.y }) })
    }

    fn root_window(&self, handle: WindowHandle) -> WindowHandle {
        handle_of(unsafe { GetAncestor(hwnd(handle), GA_ROOT) }).unwrap_or(handle)
    }

    fn focus_window_of(&self, handle: WindowHandle) -> Option<WindowHandle> {
        unsafe {
            let thread = GetWindowThreadProcessId(hwnd(handle), None);
            if thread == 0 {
                return None;
            }
            let mut info = GUITHREADINFO {
                cbSize: std::mem::size_of::<GUITHREADINFO>() as u32,
                ..Default::default()
            };
            GetGUIThreadInfo(thread, &mut info).ok()?;
            let focus = handle_of(info.hwndFocus)?;
            // Focus may sit in another top-level window owned by the same thread.
            (self.root_window(focus) == handle).then_some(focus)
        }
    }

    fn screen_to_client(&self, handle: WindowHandle, point: Point) -> Option<Point> {
        let mut p = POINT {
            x: point.x,
            y: point.y,
        };
        unsafe { ScreenToClient(hwnd(handle), &mut p) }
            .as_bool()
            .then(|| Point::new(p.x, p.y))
    }

    fn post_message(&self, handle: WindowHandle, message: WindowMessage) -> Result<(), DriverError> {
        let (msg, wparam, lparam) = match message {
            WindowMessage::MouseMove(p) => (WM_MOUSEMOVE, 0, make_lparam(p)),
            WindowMessage::LeftButtonDown(p) => (WM_LBUTTONDOWN, MK_LBUTTON, make_lparam(p)),
            WindowMessage::LeftButtonUp(p) => (WM_LBUTTONUP, 0, make_lparam(p)),
            WindowMessage::Char(unit) => (WM_CHAR, unit as usize, 1),
        };
        unsafe { PostMessageW(hwnd(handle), msg, WPARAM(wparam), LPARAM(lparam)) }.map_err(|err| {
            DriverError::WindowNotFound(format!("PostMessageW to window {} failed: {err}", handle.0))
        })
    }

    fn show_overlay(&self, spec: &OverlaySpec) -> Result<OverlaySurface, DriverError> {
        register_overlay_class()?;
        let display = self.display_info()?;
        BANNER.with(|banner| {
            *banner.borrow_mut() = Some(BannerPaint {
                text: spec.text.encode_utf16().collect(),
                background: colorref(spec.background),
                text_color: colorref(spec.text_color),
            });
        });

        unsafe {
            let module = GetModuleHandleW(None)
                .map_err(|err| DriverError::CaptureFailed(format!("GetModuleHandleW failed: {err}")))?;
            let overlay = CreateWindowExW(
                WS_EX_LAYERED | WS_EX_TOPMOST | WS_EX_TOOLWINDOW | WS_EX_TRANSPARENT | WS_EX_NOACTIVATE,
                OVERLAY_CLASS,
                w!("Capture overlay"),
                WS_POPUP,
                0,
                0,
                display.screen_width,
                spec.height,
                None,
                None,
                HINSTANCE(module.0),
                None,
            )
            .map_err(|err| DriverError::CaptureFailed(format!("overlay window: {err}")))?;

            let _ = SetLayeredWindowAttributes(overlay, COLORREF(0), spec.alpha, LWA_ALPHA);
            let excluded_from_capture =
                SetWindowDisplayAffinity(overlay, EXCLUDE_FROM_CAPTURE).is_ok();
            if !excluded_from_capture {
                debug!("SetWindowDisplayAffinity refused capture exclusion");
            }

            let _ = ShowWindow(overlay, SW_SHOWNOACTIVATE);
            let _ = UpdateWindow(overlay);

            Ok(OverlaySurface {
                handle: WindowHandle(overlay.0 as isize),
                excluded_from_capture,
            })
        }
    }

    fn hide_overlay(&self, surface: OverlaySurface) {
        unsafe {
            if let Err(err) = DestroyWindow(hwnd(surface.handle)) {
                warn!(%err, "failed to destroy overlay window");
            }
            // Let the compositor present a frame without the banner.
            let _ = DwmFlush();
        }
        BANNER.with(|banner| banner.borrow_mut().take());
    }

    fn wait(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            pump_messages();
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep((deadline - now).min(PUMP_INTERVAL));
        }
    }

    fn grab(&self, rect: Rect) -> Result<RgbaImage, DriverError> {
        let (width, height) = (rect.width(), rect.height());
        if width <= 0 || height <= 0 {
            return Err(DriverError::CaptureFailed(format!("empty capture rect {rect}")));
        }

        let mut data = vec![0u8; width as usize * height as usize * 4];
        unsafe {
            let screen_dc = GetDC(None);
            if screen_dc.is_invalid() {
                return Err(DriverError::CaptureFailed("GetDC failed".to_string()));
            }
            let mem_dc = CreateCompatibleDC(screen_dc);
            let bitmap = CreateCompatibleBitmap(screen_dc, width, height);
            let previous = SelectObject(mem_dc, bitmap);

            let blit = BitBlt(
                mem_dc,
                0,
                0,
                width,
                height,
                screen_dc,
                rect.left,
                rect.top,
                ROP_CODE(SRCCOPY.0 | CAPTUREBLT.0),
            );

            let mut bmi = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: width,
                    biHeight: -height,
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: BI_RGB.0,
                    ..Default::default()
                },
                ..Default::default()
            };
            let lines = if blit.is_ok() {
                GetDIBits(
                    mem_dc,
                    bitmap,
                    0,
                    height as u32,
                    Some(data.as_mut_ptr() as *mut c_void),
                    &mut bmi,
                    DIB_RGB_COLORS,
                )
            } else {
                0
            };

            SelectObject(mem_dc, previous);
            let _ = DeleteObject(bitmap);
            let _ = DeleteDC(mem_dc);
            ReleaseDC(None, screen_dc);

            if let Err(err) = blit {
                return Err(DriverError::CaptureFailed(format!("BitBlt failed: {err}")));
            }
            if lines != height {
                return Err(DriverError::CaptureFailed(format!(
                    "GetDIBits copied {lines} of {height} lines"
                )));
            }
        }

        // BGRA -> RGBA; the alpha byte of a screen DC is undefined.
        for px in data.chunks_exact_mut(4) {
            px.swap(0, 2);
            px[3] = 255;
        }
        RgbaImage::from_raw(width as u32, height as u32, data)
            .ok_or_else(|| DriverError::CaptureFailed("pixel buffer size mismatch".to_string()))
    }
}

fn register_overlay_class() -> Result<(), DriverError> {
    let mut result = Ok(());
    REGISTER.call_once(|| unsafe {
        let module = match GetModuleHandleW(None) {
            Ok(module) => module,
            Err(err) => {
                result = Err(DriverError::CaptureFailed(format!(
                    "GetModuleHandleW failed: {err}"
                )));
                return;
            }
        };
        let wc = WNDCLASSEXW {
            cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
            lpfnWndProc: Some(overlay_wnd_proc),
            hInstance: HINSTANCE(module.0),
            lpszClassName: OVERLAY_CLASS,
            ..Default::default()
        };
        if RegisterClassExW(&wc) == 0 {
            result = Err(DriverError::CaptureFailed(
                "RegisterClassExW failed for the overlay".to_string(),
            ));
        }
    });
    result
}

fn pump_messages() {
    unsafe {
        let mut msg = MSG::default();
        while PeekMessageW(&mut msg, HWND::default(), 0, 0, PM_REMOVE).as_bool() {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
}

unsafe extern "system" fn overlay_wnd_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match msg {
        WM_NCHITTEST => LRESULT(HTTRANSPARENT as isize),
        WM_PAINT => {
            let mut ps = PAINTSTRUCT::default();
            let hdc = BeginPaint(hwnd, &mut ps);
            let mut rect = RECT::default();
            let _ = GetClientRect(hwnd, &mut rect);

            BANNER.with(|banner| {
                if let Some(paint) = banner.borrow().as_ref() {
                    let brush = CreateSolidBrush(paint.background);
                    FillRect(hdc, &rect, brush);
                    let _ = DeleteObject(brush);

                    let font = SelectObject(hdc, GetStockObject(DEFAULT_GUI_FONT));
                    SetBkMode(hdc, TRANSPARENT);
                    SetTextColor(hdc, paint.text_color);
                    let mut text = paint.text.clone();
                    DrawTextW(hdc, &mut text, &mut rect, DT_CENTER | DT_VCENTER | DT_SINGLELINE);
                    SelectObject(hdc, font);
                }
            });

            let _ = EndPaint(hwnd, &ps);
            LRESULT(0)
        }
        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}
