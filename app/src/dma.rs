use crate::hal::pac;

/// Push `data` out USART1 with a one-shot memory-to-peripheral transfer on
/// DMA1 channel 4, blocking until the transfer completes.
///
/// The USART must already be configured; its DMA request is raised only for
/// the duration of the transfer.
pub fn splash(dma: pac::DMA1, data: &[u8]) {
    let rcc = unsafe { &*pac::RCC::ptr() };
    rcc.ahbenr.modify(|_, w| w.dma1en().set_bit());

    let usart = unsafe { &*pac::USART1::ptr() };
    usart.cr3.modify(|_, w| w.dmat().set_bit());

    let dr = &usart.dr as *const _ as u32;
    dma.ch4.par.write(|w| unsafe { w.pa().bits(dr) });
    dma.ch4.mar.write(|w| unsafe { w.ma().bits(data.as_ptr() as u32) });
    dma.ch4.ndtr.write(|w| w.ndt().bits(data.len() as u16));

    // Memory-to-peripheral, byte to byte, incrementing only the memory side
    dma.ch4.cr.modify(|_, w| unsafe {
        w.dir()
            .set_bit()
            .minc()
            .set_bit()
            .pinc()
            .clear_bit()
            .psize()
            .bits(0b00)
            .msize()
            .bits(0b00)
            .pl()
            .bits(0b01)
            .en()
            .set_bit()
    });

    while dma.isr.read().tcif4().bit_is_clear() {}

    dma.ifcr.write(|w| w.ctcif4().set_bit());
    dma.ch4.cr.modify(|_, w| w.en().clear_bit());
    usart.cr3.modify(|_, w| w.dmat().clear_bit());
}
