/// Static calibration tables for the supported cells
///
/// All ADC values are 12-bit codes of the battery-voltage channel
/// (`vbat_mv = 2500 + code * 2000 / 4096`). Temperatures are in tenths of a
/// Kelvin, see [`crate::utils::c2k`].
use crate::utils::{
    c2k, interpolate, interpolate_descending, is_strictly_ascending, is_strictly_descending,
};

/// Number of breakpoints in every SOC, weight and offset table
pub const SOC_POINTS: usize = 14;

/// Parallel x/y arrays for a piecewise-linear lookup
#[derive(Debug, Clone, Copy)]
pub struct LookupTable<const N: usize> {
    pub x: [i32; N],
    pub y: [i32; N],
}

impl<const N: usize> LookupTable<N> {
    /// Lookup on a table with ascending x
    pub fn lookup(&self, v: i32) -> i32 {
        interpolate(&self.x, &self.y, v)
    }

    /// Lookup on a table with descending x
    pub fn lookup_descending(&self, v: i32) -> i32 {
        interpolate_descending(&self.x, &self.y, v)
    }
}

/// Thermistor curve: ADC code (descending) to temperature
pub static ADC_TO_TEMPERATURE: LookupTable<22> = LookupTable {
    x: [
        2459, 1933, 1398, 1221, 981, 900, 794, 646, 529, 435, 360, 300, 250, 210, 190, 177, 150,
        127, 109, 99, 90, 88,
    ],
    y: [
        c2k(-200),
        c2k(-150),
        c2k(-80),
        c2k(-50),
        c2k(0),
        c2k(20),
        c2k(50),
        c2k(100),
        c2k(150),
        c2k(200),
        c2k(250),
        c2k(300),
        c2k(350),
        c2k(400),
        c2k(430),
        c2k(450),
        c2k(500),
        c2k(550),
        c2k(600),
        c2k(630),
        c2k(650),
        c2k(670),
    ],
};

/// ADC offset deducted from the voltage channel while the charger drives the cell
pub static ADC_TO_VBAT_OFFSET: LookupTable<10> = LookupTable {
    x: [1843, 1946, 2148, 2253, 2458, 2662, 2867, 3072, 3277, 3482],
    y: [0; 10],
};

/// ADC breakpoints per temperature band, all sharing one SOC column
#[derive(Debug, Clone, Copy)]
pub struct SocTable {
    pub adc_high: [i32; SOC_POINTS],
    pub adc_room: [i32; SOC_POINTS],
    pub adc_low: [i32; SOC_POINTS],
    pub adc_low_low: [i32; SOC_POINTS],
    pub soc: [i32; SOC_POINTS],
}

/// Smoothing weights in parts per ten thousand, per SOC breakpoint
#[derive(Debug, Clone, Copy)]
pub struct WeightTable {
    pub room: [i32; SOC_POINTS],
    pub low: [i32; SOC_POINTS],
    pub low_low: [i32; SOC_POINTS],
}

/// Complete calibration set for one cell model
#[derive(Debug)]
pub struct BatteryProfile {
    pub name: &'static str,
    pub soc: SocTable,
    pub discharge_weight: WeightTable,
    pub charge_weight: WeightTable,
    /// Expected voltage rise caused by charge current, per SOC breakpoint
    pub charge_offset: [i32; SOC_POINTS],
}

impl BatteryProfile {
    /// Pick the bundled profile for a rated capacity
    pub fn for_capacity(capacity_mah: u32) -> &'static BatteryProfile {
        if capacity_mah < 1500 {
            &PROFILE_1300MAH
        } else {
            &PROFILE_1500MAH
        }
    }

    /// Check that every band's ADC breakpoints are strictly ascending
    pub fn is_consistent(&self) -> bool {
        [
            &self.soc.adc_high,
            &self.soc.adc_room,
            &self.soc.adc_low,
            &self.soc.adc_low_low,
            &self.soc.soc,
        ]
        .iter()
        .all(|t| is_strictly_ascending(&t[..]))
    }
}

pub static PROFILE_1300MAH: BatteryProfile = BatteryProfile {
    name: "1300mAh",
    soc: SocTable {
        adc_high: [
            1800, 1870, 2060, 2270, 2400, 2510, 2585, 2635, 2685, 2781, 2933, 3064, 3230, 3444,
        ],
        adc_room: [
            1800, 1870, 2060, 2270, 2400, 2510, 2585, 2635, 2685, 2781, 2933, 3064, 3230, 3444,
        ],
        adc_low: [
            1800, 1865, 2020, 2220, 2330, 2430, 2500, 2560, 2620, 2730, 2890, 3030, 3160, 3300,
        ],
        adc_low_low: [
            1800, 1860, 1998, 2159, 2270, 2368, 2436, 2486, 2536, 2622, 2753, 2869, 3010, 3190,
        ],
        soc: [0, 1, 3, 5, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100],
    },
    discharge_weight: WeightTable {
        room: [
            3000, 2000, 700, 450, 240, 210, 170, 170, 270, 420, 380, 500, 600, 1000,
        ],
        low: [
            2900, 1900, 690, 440, 230, 215, 175, 175, 275, 425, 390, 510, 320, 900,
        ],
        low_low: [
            2600, 1700, 650, 400, 145, 120, 110, 110, 130, 140, 152, 190, 290, 560,
        ],
    },
    charge_weight: WeightTable {
        room: [
            7000, 3000, 1300, 330, 180, 120, 81, 85, 125, 185, 190, 245, 300, 600,
        ],
        low: [
            3050, 1150, 250, 150, 85, 49, 39, 37, 59, 94, 90, 114, 150, 300,
        ],
        low_low: [1500, 575, 125, 75, 46, 25, 20, 19, 30, 47, 45, 57, 75, 150],
    },
    charge_offset: [60, 60, 200, 210, 225, 225, 248, 240, 235, 220, 175, 165, 165, 0],
};

pub static PROFILE_1500MAH: BatteryProfile = BatteryProfile {
    name: "1500mAh",
    soc: SocTable {
        adc_high: [
            1800, 1850, 2020, 2200, 2440, 2550, 2630, 2685, 2735, 2840, 2990, 3115, 3245, 3444,
        ],
        adc_room: [
            1800, 1850, 2020, 2200, 2440, 2550, 2630, 2685, 2735, 2840, 2990, 3115, 3245, 3444,
        ],
        adc_low: [
            1800, 1830, 1870, 1910, 2040, 2140, 2240, 2340, 2440, 2550, 2680, 2850, 3080, 3300,
        ],
        adc_low_low: [
            1800, 1820, 1860, 1910, 1970, 2090, 2210, 2340, 2480, 2610, 2740, 2880, 3030, 3170,
        ],
        soc: [0, 1, 3, 5, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100],
    },
    discharge_weight: WeightTable {
        room: [
            2288, 1532, 543, 500, 400, 160, 130, 130, 200, 320, 290, 380, 450, 800,
        ],
        low: [
            2900, 1900, 690, 440, 230, 215, 175, 175, 275, 425, 390, 510, 300, 900,
        ],
        low_low: [
            2500, 1600, 245, 212, 180, 155, 148, 147, 162, 215, 208, 220, 225, 600,
        ],
    },
    charge_weight: WeightTable {
        room: [
            3000, 2000, 700, 450, 240, 210, 170, 170, 270, 420, 380, 500, 600, 1000,
        ],
        low: [
            3050, 1150, 250, 150, 85, 49, 39, 37, 59, 94, 90, 114, 150, 300,
        ],
        low_low: [1500, 575, 125, 75, 46, 25, 20, 19, 30, 47, 45, 57, 75, 150],
    },
    charge_offset: [60, 60, 200, 200, 210, 220, 245, 230, 230, 220, 175, 165, 165, 0],
};

/// Check the static tables that are not tied to a profile
pub fn shared_tables_consistent() -> bool {
    is_strictly_descending(&ADC_TO_TEMPERATURE.x) && is_strictly_ascending(&ADC_TO_VBAT_OFFSET.x)
}
