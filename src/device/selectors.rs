//! Core Audio 四字符常量
//!
//! 属性选择器、作用域、类 ID 等。与 CoreAudio 头文件中的值一致，
//! 这里手写是为了让设备核心在非 macOS 平台上也能编译和测试。

// ============================================================================
// 作用域 / 元素
// ============================================================================

pub const SCOPE_GLOBAL: u32 = 0x676C6F62; // 'glob'
pub const SCOPE_INPUT: u32 = 0x696E7074; // 'inpt'
pub const SCOPE_OUTPUT: u32 = 0x6F757470; // 'outp'

/// kAudioObjectPropertyElementMain
pub const ELEMENT_MAIN: u32 = 0;

/// 属性地址（对应 AudioObjectPropertyAddress）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyAddress {
    pub selector: u32,
    pub scope: u32,
    pub element: u32,
}

impl PropertyAddress {
    pub const fn new(selector: u32, scope: u32, element: u32) -> Self {
        Self {
            selector,
            scope,
            element,
        }
    }

    /// 全局作用域、主元素
    pub const fn global(selector: u32) -> Self {
        Self::new(selector, SCOPE_GLOBAL, ELEMENT_MAIN)
    }
}

impl std::fmt::Display for PropertyAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}/{}/{}]",
            FourCc(self.selector),
            FourCc(self.scope),
            self.element
        )
    }
}

/// 以四字符形式打印一个 u32（不可打印时输出数字）
#[derive(Clone, Copy)]
pub struct FourCc(pub u32);

impl std::fmt::Display for FourCc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bytes = self.0.to_be_bytes();
        if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            for b in bytes {
                write!(f, "{}", b as char)?;
            }
            Ok(())
        } else {
            write!(f, "{}", self.0)
        }
    }
}

// ============================================================================
// 类 ID
// ============================================================================

pub const CLASS_OBJECT: u32 = 0x616F626A; // 'aobj'
pub const CLASS_PLUGIN: u32 = 0x61706C67; // 'aplg'
pub const CLASS_DEVICE: u32 = 0x61646576; // 'adev'
pub const CLASS_STREAM: u32 = 0x61737472; // 'astr'
pub const CLASS_LEVEL_CONTROL: u32 = 0x6C65766C; // 'levl'
pub const CLASS_VOLUME_CONTROL: u32 = 0x766C6D65; // 'vlme'

// ============================================================================
// AudioObject 通用属性
// ============================================================================

pub const BASE_CLASS: u32 = 0x62636C73; // 'bcls'
pub const CLASS: u32 = 0x636C6173; // 'clas'
pub const OWNER: u32 = 0x73746476; // 'stdv'
pub const NAME: u32 = 0x6C6E616D; // 'lnam'
pub const MANUFACTURER: u32 = 0x6C6D616B; // 'lmak'
pub const OWNED_OBJECTS: u32 = 0x6F776E64; // 'ownd'
pub const ELEMENT_NAME: u32 = 0x6C63686E; // 'lchn'
pub const CONTROL_LIST: u32 = 0x6374726C; // 'ctrl'

// ============================================================================
// PlugIn 属性
// ============================================================================

pub const PLUGIN_DEVICE_LIST: u32 = 0x64657623; // 'dev#'
pub const PLUGIN_TRANSLATE_UID_TO_DEVICE: u32 = 0x75696464; // 'uidd'
pub const PLUGIN_RESOURCE_BUNDLE: u32 = 0x72737263; // 'rsrc'

// ============================================================================
// Device 属性
// ============================================================================

pub const DEVICE_UID: u32 = 0x75696420; // 'uid '
pub const DEVICE_MODEL_UID: u32 = 0x6D756964; // 'muid'
pub const DEVICE_TRANSPORT_TYPE: u32 = 0x7472616E; // 'tran'
pub const DEVICE_RELATED_DEVICES: u32 = 0x616B696E; // 'akin'
pub const DEVICE_CLOCK_DOMAIN: u32 = 0x636C6B64; // 'clkd'
pub const DEVICE_IS_ALIVE: u32 = 0x6C69766E; // 'livn'
pub const DEVICE_IS_RUNNING: u32 = 0x676F696E; // 'goin'
pub const DEVICE_CAN_BE_DEFAULT: u32 = 0x64666C74; // 'dflt'
pub const DEVICE_CAN_BE_DEFAULT_SYSTEM: u32 = 0x73666C74; // 'sflt'
pub const DEVICE_LATENCY: u32 = 0x6C746E63; // 'ltnc'
pub const DEVICE_STREAMS: u32 = 0x73746D23; // 'stm#'
pub const DEVICE_NOMINAL_SAMPLE_RATE: u32 = 0x6E737274; // 'nsrt'
pub const DEVICE_AVAILABLE_SAMPLE_RATES: u32 = 0x6E737223; // 'nsr#'
pub const DEVICE_ZERO_TIMESTAMP_PERIOD: u32 = 0x72696E67; // 'ring'
pub const DEVICE_ICON: u32 = 0x69636F6E; // 'icon'
pub const DEVICE_IS_HIDDEN: u32 = 0x6869646E; // 'hidn'
pub const DEVICE_SAFETY_OFFSET: u32 = 0x73616674; // 'saft'

// ============================================================================
// Stream 属性
// ============================================================================

pub const STREAM_IS_ACTIVE: u32 = 0x73616374; // 'sact'
pub const STREAM_DIRECTION: u32 = 0x73646972; // 'sdir'
pub const STREAM_TERMINAL_TYPE: u32 = 0x7465726D; // 'term'
pub const STREAM_STARTING_CHANNEL: u32 = 0x7363686E; // 'schn'
pub const STREAM_LATENCY: u32 = DEVICE_LATENCY;
pub const STREAM_VIRTUAL_FORMAT: u32 = 0x73666D74; // 'sfmt'
pub const STREAM_PHYSICAL_FORMAT: u32 = 0x70667420; // 'pft '
pub const STREAM_AVAILABLE_VIRTUAL_FORMATS: u32 = 0x73666D61; // 'sfma'
pub const STREAM_AVAILABLE_PHYSICAL_FORMATS: u32 = 0x70667461; // 'pfta'

// ============================================================================
// Control 属性
// ============================================================================

pub const CONTROL_SCOPE: u32 = 0x63736370; // 'cscp'
pub const CONTROL_ELEMENT: u32 = 0x63656C6D; // 'celm'
pub const LEVEL_SCALAR_VALUE: u32 = 0x6C637376; // 'lcsv'
pub const LEVEL_DECIBEL_VALUE: u32 = 0x6C636476; // 'lcdv'
pub const LEVEL_DECIBEL_RANGE: u32 = 0x6C636472; // 'lcdr'
pub const BOOLEAN_VALUE: u32 = 0x6263766C; // 'bcvl'

// ============================================================================
// 其它取值
// ============================================================================

pub const TRANSPORT_VIRTUAL: u32 = 0x76697274; // 'virt'
pub const TERMINAL_LINE: u32 = 0x6C696E65; // 'line'
pub const TERMINAL_MICROPHONE: u32 = 0x6D696372; // 'micr'

/// IO 操作（kAudioServerPlugInIOOperation*）
pub const IO_OPERATION_READ_INPUT: u32 = 0x72656164; // 'read'
pub const IO_OPERATION_WRITE_MIX: u32 = 0x72697465; // 'rite'
