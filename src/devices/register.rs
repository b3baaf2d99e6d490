use crate::err::DeviceError;

pub trait Register {
    fn read(&self) -> u32;
    fn write(&mut self, value: u32) -> Result<(), DeviceError>;
    fn reset(&mut self);
}

/// Plain storage register: the guest reads back exactly what it wrote
#[derive(Debug, Clone)]
pub struct RwRegister {
    value: u32,
}

impl RwRegister {
    pub fn new(initial_value: u32) -> Self {
        Self {
            value: initial_value,
        }
    }
}

impl Register for RwRegister {
    fn read(&self) -> u32 {
        self.value
    }

    fn write(&mut self, value: u32) -> Result<(), DeviceError> {
        self.value = value;
        Ok(())
    }

    fn reset(&mut self) {
        self.value = 0;
    }
}

/// Register whose value is maintained by the device, not the guest
#[derive(Debug, Clone)]
pub struct RoRegister {
    value: u32,
}

impl RoRegister {
    pub fn new(initial_value: u32) -> Self {
        Self {
            value: initial_value,
        }
    }

    pub fn set_value(&mut self, value: u32) {
        self.value = value;
    }
}

impl Register for RoRegister {
    fn read(&self) -> u32 {
        self.value
    }

    fn write(&mut self, _value: u32) -> Result<(), DeviceError> {
        // just ignore writes
        Ok(())
    }

    fn reset(&mut self) {
        self.value = 0;
    }
}
